//! The one place that talks to `sqlite3_create_function_v2`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::sync::Arc;

use fsqlite_error::{FrankenError, Result};
use rusqlite::{Connection, ffi};
use tracing::{debug, warn};

use crate::options::FunctionOptions;

pub(crate) type ScalarCallback =
    unsafe extern "C" fn(*mut ffi::sqlite3_context, c_int, *mut *mut ffi::sqlite3_value);
pub(crate) type FinalCallback = unsafe extern "C" fn(*mut ffi::sqlite3_context);

/// Callback set for one registration. Scalar and aggregate shapes are
/// mutually exclusive.
pub(crate) enum Callbacks {
    Scalar(ScalarCallback),
    Aggregate {
        step: ScalarCallback,
        finish: FinalCallback,
    },
}

impl Callbacks {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Aggregate { .. } => "aggregate",
        }
    }
}

/// Map key for a function name. SQLite matches names case-insensitively.
pub(crate) fn canonical_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Register `holder` with the engine under `name`.
///
/// The engine receives its own strong reference to `holder` as user data
/// and drops it through `release::<H>` when the function is replaced,
/// when the connection closes, or when this registration fails.
pub(crate) fn register<H: Send + Sync + 'static>(
    conn: &Connection,
    name: &str,
    nargs: i32,
    options: FunctionOptions,
    holder: &Arc<H>,
    callbacks: Callbacks,
) -> Result<()> {
    let c_name = CString::new(name).map_err(|_| FrankenError::InvalidFunctionName {
        name: name.to_owned(),
    })?;
    let kind = callbacks.kind();
    let (x_func, x_step, x_final) = match callbacks {
        Callbacks::Scalar(func) => (Some(func), None, None),
        Callbacks::Aggregate { step, finish } => (None, Some(step), Some(finish)),
    };
    let user_data = Arc::into_raw(Arc::clone(holder)).cast_mut().cast::<c_void>();

    // SAFETY: `conn` is open; `c_name` outlives the call; `user_data` is a
    // leaked `Arc<H>` that `release::<H>` reclaims exactly once, including
    // on failure.
    let rc = unsafe {
        ffi::sqlite3_create_function_v2(
            conn.handle(),
            c_name.as_ptr(),
            nargs,
            options.flags(),
            user_data,
            x_func,
            x_step,
            x_final,
            Some(release::<H>),
        )
    };

    if rc != ffi::SQLITE_OK {
        let message = errmsg(conn);
        warn!(
            target: "fsqlite.func",
            name,
            arity = nargs,
            kind,
            code = rc,
            error = %message,
            "function registration failed"
        );
        return Err(FrankenError::registration(name, nargs, rc, message));
    }

    debug!(target: "fsqlite.func", name, arity = nargs, kind, "function registered");
    Ok(())
}

unsafe extern "C" fn release<H>(user_data: *mut c_void) {
    if !user_data.is_null() {
        // SAFETY: produced by `Arc::into_raw` in `register` for this `H`.
        drop(unsafe { Arc::from_raw(user_data.cast_const().cast::<H>()) });
    }
}

fn errmsg(conn: &Connection) -> String {
    // SAFETY: the handle is open and the message is copied immediately.
    unsafe {
        let msg = ffi::sqlite3_errmsg(conn.handle());
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}
