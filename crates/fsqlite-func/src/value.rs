//! Value kinds crossing the callback boundary.
//!
//! Arguments arrive as engine value cells and are pulled out through
//! [`FromArg`]. Results leave through the closed [`ResultValue`] variant:
//! every supported return type converts into it with `From`, so the
//! adapter picks the engine setter from the variant and never from the
//! Rust return type.

use std::borrow::Cow;
use std::fmt;
use std::os::raw::c_int;

use rusqlite::ffi;

use crate::context::ValueContext;

/// Storage class reported by a value cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

impl ValueType {
    /// Decode the engine's `sqlite3_value_type` tag.
    pub(crate) const fn from_raw(tag: c_int) -> Self {
        match tag {
            ffi::SQLITE_INTEGER => Self::Integer,
            ffi::SQLITE_FLOAT => Self::Float,
            ffi::SQLITE_TEXT => Self::Text,
            ffi::SQLITE_BLOB => Self::Blob,
            _ => Self::Null,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "INTEGER",
            Self::Float => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Null => "NULL",
        })
    }
}

/// An owned, dynamically-typed SQL value.
///
/// Handlers that want to see the argument exactly as stored (no coercion)
/// take `Value`; returning one emits the matching result kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Float(f64),
    /// A UTF-8 text string.
    Text(String),
    /// A binary large object.
    Blob(Vec<u8>),
}

impl Value {
    /// Storage class of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Integer(_) => ValueType::Integer,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Blob(_) => ValueType::Blob,
        }
    }

    /// Returns true if this is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// The closed set of results a function call can produce.
///
/// `Text`/`Blob` are copied by the engine before the call returns;
/// `StaticText` is handed over without a copy.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultValue<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Text(Cow<'a, str>),
    StaticText(&'static str),
    Blob(Cow<'a, [u8]>),
    /// Marks the call as failed; the message becomes the statement error.
    Error(Cow<'a, str>),
}

impl ResultValue<'_> {
    /// Whether this result fails the call instead of producing a value.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<()> for ResultValue<'_> {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<i32> for ResultValue<'_> {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for ResultValue<'_> {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for ResultValue<'_> {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for ResultValue<'_> {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl<'a> From<&'a str> for ResultValue<'a> {
    fn from(v: &'a str) -> Self {
        Self::Text(Cow::Borrowed(v))
    }
}

impl From<String> for ResultValue<'_> {
    fn from(v: String) -> Self {
        Self::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a [u8]> for ResultValue<'a> {
    fn from(v: &'a [u8]) -> Self {
        Self::Blob(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for ResultValue<'_> {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(Cow::Owned(v))
    }
}

impl From<Value> for ResultValue<'_> {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Integer(i) => Self::Integer(i),
            Value::Float(f) => Self::Float(f),
            Value::Text(s) => Self::Text(Cow::Owned(s)),
            Value::Blob(b) => Self::Blob(Cow::Owned(b)),
        }
    }
}

impl<'a, T> From<Option<T>> for ResultValue<'a>
where
    T: Into<ResultValue<'a>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<'a, T, E> From<Result<T, E>> for ResultValue<'a>
where
    T: Into<ResultValue<'a>>,
    E: fmt::Display,
{
    fn from(v: Result<T, E>) -> Self {
        match v {
            Ok(value) => value.into(),
            Err(err) => Self::Error(Cow::Owned(err.to_string())),
        }
    }
}

/// Typed extraction of one argument cell.
///
/// Conversions follow the engine's own coercion rules: asking for an
/// integer from a TEXT cell parses it the way SQLite does, a NULL cell
/// reads as zero or empty, and an index past the last argument behaves
/// like a NULL cell. Use `Option<T>` to observe NULL explicitly.
pub trait FromArg: Sized {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self;
}

impl FromArg for i32 {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_int(idx)
    }
}

impl FromArg for i64 {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_int64(idx)
    }
}

impl FromArg for bool {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_int64(idx) != 0
    }
}

impl FromArg for f64 {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_double(idx)
    }
}

impl FromArg for String {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_text(idx)
    }
}

impl FromArg for Vec<u8> {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        ctx.get_blob(idx)
    }
}

impl FromArg for Value {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        match ctx.args_type(idx) {
            ValueType::Null => Self::Null,
            ValueType::Integer => Self::Integer(ctx.get_int64(idx)),
            ValueType::Float => Self::Float(ctx.get_double(idx)),
            ValueType::Text => Self::Text(ctx.get_text(idx)),
            ValueType::Blob => Self::Blob(ctx.get_blob(idx)),
        }
    }
}

impl<T: FromArg> FromArg for Option<T> {
    fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
        if ctx.args_type(idx) == ValueType::Null {
            None
        } else {
            Some(T::from_arg(ctx, idx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_from_raw() {
        assert_eq!(ValueType::from_raw(ffi::SQLITE_INTEGER), ValueType::Integer);
        assert_eq!(ValueType::from_raw(ffi::SQLITE_FLOAT), ValueType::Float);
        assert_eq!(ValueType::from_raw(ffi::SQLITE_TEXT), ValueType::Text);
        assert_eq!(ValueType::from_raw(ffi::SQLITE_BLOB), ValueType::Blob);
        assert_eq!(ValueType::from_raw(ffi::SQLITE_NULL), ValueType::Null);
        assert_eq!(ValueType::from_raw(42), ValueType::Null);
    }

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::Float.to_string(), "REAL");
        assert_eq!(Value::Blob(vec![1]).value_type().to_string(), "BLOB");
    }

    #[test]
    fn test_result_from_primitives() {
        assert_eq!(ResultValue::from(()), ResultValue::Null);
        assert_eq!(ResultValue::from(7_i32), ResultValue::Integer(7));
        assert_eq!(ResultValue::from(i64::MAX), ResultValue::Integer(i64::MAX));
        assert_eq!(ResultValue::from(true), ResultValue::Integer(1));
        assert_eq!(ResultValue::from(0.5_f64), ResultValue::Float(0.5));
        assert_eq!(
            ResultValue::from("abc"),
            ResultValue::Text(Cow::Borrowed("abc"))
        );
        assert_eq!(
            ResultValue::from(vec![0_u8, 1]),
            ResultValue::Blob(Cow::Owned(vec![0, 1]))
        );
    }

    #[test]
    fn test_result_from_option_and_result() {
        assert_eq!(ResultValue::from(None::<i64>), ResultValue::Null);
        assert_eq!(ResultValue::from(Some(3_i64)), ResultValue::Integer(3));

        let ok: Result<i64, String> = Ok(4);
        assert_eq!(ResultValue::from(ok), ResultValue::Integer(4));

        let err: Result<i64, fsqlite_error::FrankenError> =
            Err(fsqlite_error::FrankenError::function_error("negative input"));
        let emitted = ResultValue::from(err);
        assert!(emitted.is_error());
        assert_eq!(emitted, ResultValue::Error(Cow::Borrowed("negative input")));
    }

    #[test]
    fn test_result_from_value() {
        assert_eq!(ResultValue::from(Value::Null), ResultValue::Null);
        assert_eq!(
            ResultValue::from(Value::Text("x".to_owned())),
            ResultValue::Text(Cow::Borrowed("x"))
        );
        assert!(Value::Null.is_null());
        assert!(!Value::Integer(0).is_null());
    }
}
