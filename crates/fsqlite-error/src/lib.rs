use std::os::raw::c_int;

use thiserror::Error;

/// Primary error type for the function adapter layer.
///
/// Registration failures carry the engine's own status code untouched so
/// callers see exactly what `sqlite3_create_function_v2` reported.
#[derive(Error, Debug)]
pub enum FrankenError {
    /// The engine rejected a function registration.
    #[error("failed to register function {name}/{arity}: {message} (code {code})")]
    Registration {
        name: String,
        arity: i32,
        code: c_int,
        message: String,
    },

    /// Function name cannot be handed to the engine.
    #[error("invalid function name {name:?}: contains an interior NUL byte")]
    InvalidFunctionName { name: String },

    /// SQL function domain/runtime error (analogous to `sqlite3_result_error`).
    #[error("{0}")]
    FunctionError(String),
}

/// SQLite primary result codes.
///
/// These match the numeric values from C SQLite's `sqlite3.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Internal logic error.
    Internal = 2,
    /// Access permission denied.
    Perm = 3,
    /// Callback requested abort.
    Abort = 4,
    /// Database file is locked.
    Busy = 5,
    /// Table is locked.
    Locked = 6,
    /// Out of memory.
    NoMem = 7,
    /// Attempt to write a read-only database.
    ReadOnly = 8,
    /// Interrupted by `sqlite3_interrupt()`.
    Interrupt = 9,
    /// Disk I/O error.
    IoErr = 10,
    /// Database disk image is malformed.
    Corrupt = 11,
    /// Not found (internal).
    NotFound = 12,
    /// Database or disk is full.
    Full = 13,
    /// Unable to open database file.
    CantOpen = 14,
    /// Locking protocol error.
    Protocol = 15,
    /// (Not used).
    Empty = 16,
    /// Database schema has changed.
    Schema = 17,
    /// String or BLOB exceeds size limit.
    TooBig = 18,
    /// Constraint violation.
    Constraint = 19,
    /// Data type mismatch.
    Mismatch = 20,
    /// Library used incorrectly.
    Misuse = 21,
    /// OS feature not available.
    NoLfs = 22,
    /// Authorization denied.
    Auth = 23,
    /// Not used.
    Format = 24,
    /// Bind parameter out of range.
    Range = 25,
    /// Not a database file.
    NotADb = 26,
    /// Notification (not an error).
    Notice = 27,
    /// Warning (not an error).
    Warning = 28,
    /// `sqlite3_step()` has another row ready.
    Row = 100,
    /// `sqlite3_step()` has finished executing.
    Done = 101,
}

impl ErrorCode {
    /// Decode a raw engine status, ignoring extended result code bits.
    ///
    /// Returns `None` for values outside the primary code table.
    #[must_use]
    pub const fn from_raw(code: c_int) -> Option<Self> {
        let code = match code & 0xff {
            0 => Self::Ok,
            1 => Self::Error,
            2 => Self::Internal,
            3 => Self::Perm,
            4 => Self::Abort,
            5 => Self::Busy,
            6 => Self::Locked,
            7 => Self::NoMem,
            8 => Self::ReadOnly,
            9 => Self::Interrupt,
            10 => Self::IoErr,
            11 => Self::Corrupt,
            12 => Self::NotFound,
            13 => Self::Full,
            14 => Self::CantOpen,
            15 => Self::Protocol,
            16 => Self::Empty,
            17 => Self::Schema,
            18 => Self::TooBig,
            19 => Self::Constraint,
            20 => Self::Mismatch,
            21 => Self::Misuse,
            22 => Self::NoLfs,
            23 => Self::Auth,
            24 => Self::Format,
            25 => Self::Range,
            26 => Self::NotADb,
            27 => Self::Notice,
            28 => Self::Warning,
            100 => Self::Row,
            101 => Self::Done,
            _ => return None,
        };
        Some(code)
    }
}

impl FrankenError {
    /// The raw status code, exactly as the engine returned it.
    ///
    /// Errors raised before the engine was reached report `SQLITE_MISUSE`
    /// (name problems) or `SQLITE_ERROR`.
    #[must_use]
    pub const fn raw_code(&self) -> c_int {
        match self {
            Self::Registration { code, .. } => *code,
            Self::InvalidFunctionName { .. } => ErrorCode::Misuse as c_int,
            Self::FunctionError(_) => ErrorCode::Error as c_int,
        }
    }

    /// Map this error to a SQLite primary result code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match ErrorCode::from_raw(self.raw_code()) {
            Some(code) => code,
            None => ErrorCode::Error,
        }
    }

    /// Whether retrying the same registration later can succeed.
    ///
    /// SQLite refuses to replace a function while statements using the
    /// connection are still running (`SQLITE_BUSY`).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.error_code(), ErrorCode::Busy | ErrorCode::Locked)
    }

    /// Create a registration error.
    pub fn registration(
        name: impl Into<String>,
        arity: i32,
        code: c_int,
        message: impl Into<String>,
    ) -> Self {
        Self::Registration {
            name: name.into(),
            arity,
            code,
            message: message.into(),
        }
    }

    /// Create a function domain error.
    pub fn function_error(msg: impl Into<String>) -> Self {
        Self::FunctionError(msg.into())
    }
}

/// Result type alias using `FrankenError`.
pub type Result<T> = std::result::Result<T, FrankenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_registration() {
        let err = FrankenError::registration("add2", 2, 21, "bad parameter or other API misuse");
        assert_eq!(
            err.to_string(),
            "failed to register function add2/2: bad parameter or other API misuse (code 21)"
        );
    }

    #[test]
    fn error_display_function() {
        let err = FrankenError::function_error("division by zero");
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn raw_code_is_verbatim() {
        // SQLITE_BUSY_SNAPSHOT (extended) must come back untouched.
        let err = FrankenError::registration("f", 0, 517, "busy");
        assert_eq!(err.raw_code(), 517);
        assert_eq!(err.error_code(), ErrorCode::Busy);
        assert!(err.is_transient());
    }

    #[test]
    fn invalid_name_is_misuse() {
        let err = FrankenError::InvalidFunctionName {
            name: "a\0b".to_owned(),
        };
        assert_eq!(err.error_code(), ErrorCode::Misuse);
        assert_eq!(err.raw_code(), 21);
        assert!(!err.is_transient());
    }

    #[test]
    fn from_raw_masks_extended_bits() {
        assert_eq!(ErrorCode::from_raw(0), Some(ErrorCode::Ok));
        assert_eq!(ErrorCode::from_raw(21), Some(ErrorCode::Misuse));
        assert_eq!(ErrorCode::from_raw(261), Some(ErrorCode::Busy));
        assert_eq!(ErrorCode::from_raw(99), None);
    }

    #[test]
    fn unknown_code_maps_to_generic_error() {
        let err = FrankenError::registration("f", 1, 99, "?");
        assert_eq!(err.error_code(), ErrorCode::Error);
    }

    #[test]
    fn error_code_values() {
        assert_eq!(ErrorCode::Ok as i32, 0);
        assert_eq!(ErrorCode::Error as i32, 1);
        assert_eq!(ErrorCode::Busy as i32, 5);
        assert_eq!(ErrorCode::Misuse as i32, 21);
        assert_eq!(ErrorCode::Row as i32, 100);
        assert_eq!(ErrorCode::Done as i32, 101);
    }
}
