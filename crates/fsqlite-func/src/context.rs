//! Per-invocation view over the engine's call context.
//!
//! A [`ValueContext`] is built by an adapter thunk on entry and dropped
//! before the thunk returns. It never outlives the callback: every raw
//! pointer it holds is only valid for that one call.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::NonNull;
use std::slice;

use rusqlite::ffi;

use crate::value::{FromArg, ResultValue, ValueType};

/// Arguments, result slot and per-bucket memory of one function call.
///
/// Argument accessors never fail: an out-of-range index behaves like a
/// NULL cell, and a cell of another storage class is converted with the
/// engine's own coercion rules.
pub struct ValueContext<'a> {
    ctx: *mut ffi::sqlite3_context,
    args: &'a [*mut ffi::sqlite3_value],
    _call: PhantomData<&'a mut ffi::sqlite3_context>,
}

impl<'a> ValueContext<'a> {
    /// Wrap the raw callback arguments.
    ///
    /// # Safety
    /// `ctx` must be the live call context handed to the callback, and
    /// `argv` must point to `argc` valid value cells (it may be null when
    /// `argc` is zero). Both must stay valid for `'a`.
    pub(crate) unsafe fn from_raw(
        ctx: *mut ffi::sqlite3_context,
        argc: c_int,
        argv: *mut *mut ffi::sqlite3_value,
    ) -> Self {
        let args = match usize::try_from(argc) {
            Ok(n) if n > 0 && !argv.is_null() => {
                // SAFETY: the engine passes `argc` consecutive cell pointers.
                unsafe { slice::from_raw_parts(argv.cast_const(), n) }
            }
            _ => &[],
        };
        Self {
            ctx,
            args,
            _call: PhantomData,
        }
    }

    fn cell(&self, idx: usize) -> Option<*mut ffi::sqlite3_value> {
        self.args.get(idx).copied().filter(|cell| !cell.is_null())
    }

    /// Number of arguments supplied to this call.
    pub const fn args_count(&self) -> usize {
        self.args.len()
    }

    /// Storage class of argument `idx`.
    pub fn args_type(&self, idx: usize) -> ValueType {
        self.cell(idx).map_or(ValueType::Null, |cell| {
            // SAFETY: `cell` is a live argument of this call.
            ValueType::from_raw(unsafe { ffi::sqlite3_value_type(cell) })
        })
    }

    /// Byte length of argument `idx` as text or blob.
    pub fn args_bytes(&self, idx: usize) -> usize {
        self.cell(idx).map_or(0, |cell| {
            // SAFETY: `cell` is a live argument of this call.
            let n = unsafe { ffi::sqlite3_value_bytes(cell) };
            usize::try_from(n).unwrap_or(0)
        })
    }

    /// Extract argument `idx` as `T`.
    pub fn get<T: FromArg>(&self, idx: usize) -> T {
        T::from_arg(self, idx)
    }

    /// Argument `idx` as a 32-bit integer (engine truncation applies).
    pub fn get_int(&self, idx: usize) -> i32 {
        // SAFETY: `cell` is a live argument of this call.
        self.cell(idx)
            .map_or(0, |cell| unsafe { ffi::sqlite3_value_int(cell) })
    }

    /// Argument `idx` as a 64-bit integer.
    pub fn get_int64(&self, idx: usize) -> i64 {
        // SAFETY: `cell` is a live argument of this call.
        self.cell(idx)
            .map_or(0, |cell| unsafe { ffi::sqlite3_value_int64(cell) })
    }

    /// Argument `idx` as a double.
    pub fn get_double(&self, idx: usize) -> f64 {
        // SAFETY: `cell` is a live argument of this call.
        self.cell(idx)
            .map_or(0.0, |cell| unsafe { ffi::sqlite3_value_double(cell) })
    }

    /// Argument `idx` as an owned string. Invalid UTF-8 is replaced.
    pub fn get_text(&self, idx: usize) -> String {
        self.cell(idx).map_or_else(String::new, |cell| {
            // SAFETY: `cell` is live; the bytes are copied before any other
            // accessor can convert the cell again.
            let bytes = unsafe { text_bytes(cell) };
            String::from_utf8_lossy(bytes).into_owned()
        })
    }

    /// Argument `idx` as an owned byte vector.
    pub fn get_blob(&self, idx: usize) -> Vec<u8> {
        self.cell(idx).map_or_else(Vec::new, |cell| {
            // SAFETY: as in `get_text`.
            unsafe { blob_bytes(cell) }.to_vec()
        })
    }

    /// Borrow argument `idx` as UTF-8 text without copying.
    ///
    /// Returns `None` for NULL cells and for text that is not valid UTF-8.
    /// The exclusive borrow keeps other conversions of the cell, which
    /// would invalidate the buffer, from running while the slice is alive.
    pub fn text_ref(&mut self, idx: usize) -> Option<&str> {
        let cell = self.cell(idx)?;
        // SAFETY: `cell` is live and `self` is exclusively borrowed.
        if unsafe { ffi::sqlite3_value_type(cell) } == ffi::SQLITE_NULL {
            return None;
        }
        // SAFETY: as above.
        std::str::from_utf8(unsafe { text_bytes(cell) }).ok()
    }

    /// Borrow argument `idx` as raw bytes without copying.
    pub fn blob_ref(&mut self, idx: usize) -> &[u8] {
        match self.cell(idx) {
            // SAFETY: `cell` is live and `self` is exclusively borrowed.
            Some(cell) => unsafe { blob_bytes(cell) },
            None => &[],
        }
    }

    /// Emit `value` as the result of this call.
    pub fn result<'v>(&mut self, value: impl Into<ResultValue<'v>>) {
        self.emit(value.into());
    }

    /// Write one result variant through the matching engine setter.
    pub fn emit(&mut self, value: ResultValue<'_>) {
        let ctx = self.ctx;
        // SAFETY: `ctx` is the live call context; text and blob buffers are
        // copied by the engine (TRANSIENT) unless they are 'static.
        unsafe {
            match value {
                ResultValue::Null => ffi::sqlite3_result_null(ctx),
                ResultValue::Integer(v) => ffi::sqlite3_result_int64(ctx, v),
                ResultValue::Float(v) => ffi::sqlite3_result_double(ctx, v),
                ResultValue::Text(text) => {
                    result_text(ctx, text.as_bytes(), ffi::SQLITE_TRANSIENT());
                }
                ResultValue::StaticText(text) => {
                    result_text(ctx, text.as_bytes(), ffi::SQLITE_STATIC());
                }
                ResultValue::Blob(bytes) => {
                    if bytes.is_empty() {
                        ffi::sqlite3_result_zeroblob(ctx, 0);
                    } else {
                        ffi::sqlite3_result_blob64(
                            ctx,
                            bytes.as_ptr().cast::<c_void>(),
                            bytes.len() as u64,
                            ffi::SQLITE_TRANSIENT(),
                        );
                    }
                }
                ResultValue::Error(msg) => result_error(ctx, &msg),
            }
        }
    }

    /// Emit SQL NULL.
    pub fn result_null(&mut self) {
        self.emit(ResultValue::Null);
    }

    /// Fail this call with `msg` as the statement error.
    pub fn result_error(&mut self, msg: &str) {
        self.emit(ResultValue::Error(Cow::Borrowed(msg)));
    }

    /// Copy argument `idx` verbatim into the result slot.
    ///
    /// An out-of-range index yields NULL.
    pub fn result_copy(&mut self, idx: usize) {
        match self.cell(idx) {
            // SAFETY: both pointers belong to this call.
            Some(cell) => unsafe { ffi::sqlite3_result_value(self.ctx, cell) },
            None => self.result_null(),
        }
    }

    /// Report an allocation failure to the engine.
    pub(crate) fn result_error_nomem(&mut self) {
        // SAFETY: `ctx` is the live call context.
        unsafe { ffi::sqlite3_result_error_nomem(self.ctx) }
    }

    /// Per-bucket scratch memory of an aggregate call.
    ///
    /// The first call for a bucket allocates exactly `size` zeroed bytes;
    /// later calls return the same buffer regardless of `size`. Returns
    /// `None` when the allocation fails or `size` is zero and nothing has
    /// been allocated yet. The buffer is 8-byte aligned and is reclaimed
    /// by the engine after the finish call.
    pub fn aggregate_data(&self, size: usize) -> Option<NonNull<u8>> {
        let n = c_int::try_from(size).ok()?;
        // SAFETY: `ctx` is the live call context of an aggregate.
        let raw = unsafe { ffi::sqlite3_aggregate_context(self.ctx, n) };
        NonNull::new(raw.cast::<u8>())
    }

    /// Number of step calls seen so far for the current bucket.
    ///
    /// Reads 1 during the step call that first touches a bucket.
    pub fn aggregate_count(&self) -> i32 {
        // SAFETY: `ctx` is the live call context of an aggregate.
        unsafe { ffi::sqlite3_aggregate_count(self.ctx) }
    }

    /// The user-data pointer the function was registered with.
    pub(crate) fn user_data(&self) -> *mut c_void {
        // SAFETY: `ctx` is the live call context.
        unsafe { ffi::sqlite3_user_data(self.ctx) }
    }
}

/// # Safety
/// `cell` must be a live value cell. The slice is valid until the cell is
/// converted again or the call returns.
unsafe fn text_bytes<'c>(cell: *mut ffi::sqlite3_value) -> &'c [u8] {
    // SAFETY: `text` must be called before `bytes` so the length matches
    // the UTF-8 representation.
    unsafe {
        let ptr = ffi::sqlite3_value_text(cell);
        let len = usize::try_from(ffi::sqlite3_value_bytes(cell)).unwrap_or(0);
        if ptr.is_null() || len == 0 {
            &[]
        } else {
            slice::from_raw_parts(ptr, len)
        }
    }
}

/// # Safety
/// Same contract as [`text_bytes`].
unsafe fn blob_bytes<'c>(cell: *mut ffi::sqlite3_value) -> &'c [u8] {
    // SAFETY: `blob` before `bytes`, as for text.
    unsafe {
        let ptr = ffi::sqlite3_value_blob(cell).cast::<u8>();
        let len = usize::try_from(ffi::sqlite3_value_bytes(cell)).unwrap_or(0);
        if ptr.is_null() || len == 0 {
            &[]
        } else {
            slice::from_raw_parts(ptr, len)
        }
    }
}

/// # Safety
/// `ctx` must be a live call context.
unsafe fn result_text(
    ctx: *mut ffi::sqlite3_context,
    text: &[u8],
    destructor: ffi::sqlite3_destructor_type,
) {
    // SAFETY: the engine copies `text` or, for STATIC, keeps a 'static slice.
    unsafe {
        ffi::sqlite3_result_text64(
            ctx,
            text.as_ptr().cast::<c_char>(),
            text.len() as u64,
            destructor,
            ffi::SQLITE_UTF8 as u8,
        );
    }
}

/// # Safety
/// `ctx` must be a live call context.
unsafe fn result_error(ctx: *mut ffi::sqlite3_context, msg: &str) {
    let len = c_int::try_from(msg.len()).unwrap_or(c_int::MAX);
    // SAFETY: the engine copies at most `len` bytes of `msg`.
    unsafe { ffi::sqlite3_result_error(ctx, msg.as_ptr().cast::<c_char>(), len) }
}
