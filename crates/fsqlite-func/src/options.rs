//! Registration flags applied to new functions.

use std::os::raw::c_int;

use rusqlite::ffi;
use serde::{Deserialize, Serialize};

/// Function properties passed to the engine at registration time.
///
/// Text encoding is always UTF-8. All properties default to off, which is
/// what a plain `sqlite3_create_function` call would register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionOptions {
    /// Same inputs always give the same output; enables constant folding
    /// and use in index expressions.
    pub deterministic: bool,
    /// Only callable from top-level SQL, never from triggers, views or
    /// schema expressions.
    pub direct_only: bool,
    /// Safe to call from schema expressions even under
    /// `trusted_schema = OFF`.
    pub innocuous: bool,
}

impl FunctionOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deterministic: false,
            direct_only: false,
            innocuous: false,
        }
    }

    #[must_use]
    pub const fn deterministic(mut self, yes: bool) -> Self {
        self.deterministic = yes;
        self
    }

    #[must_use]
    pub const fn direct_only(mut self, yes: bool) -> Self {
        self.direct_only = yes;
        self
    }

    #[must_use]
    pub const fn innocuous(mut self, yes: bool) -> Self {
        self.innocuous = yes;
        self
    }

    /// The `eTextRep` argument for `sqlite3_create_function_v2`.
    pub(crate) const fn flags(self) -> c_int {
        let mut flags = ffi::SQLITE_UTF8;
        if self.deterministic {
            flags |= ffi::SQLITE_DETERMINISTIC;
        }
        if self.direct_only {
            flags |= ffi::SQLITE_DIRECTONLY;
        }
        if self.innocuous {
            flags |= ffi::SQLITE_INNOCUOUS;
        }
        flags
    }
}
