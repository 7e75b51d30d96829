//! Scalar (row-level) function registration.
//!
//! Scalar functions compute a single output value from zero or more input
//! values. They are stateless across rows: each invocation is independent.
//!
//! Two paths feed the same machinery:
//!
//! - [`FunctionRegistry::create_raw`] takes a hand-written handler that
//!   receives the [`ValueContext`] and does its own extraction.
//! - [`FunctionRegistry::create`] takes a typed callable such as
//!   `|a: i64, b: i64| a + b`; arity and argument types come from its
//!   signature (see [`crate::arity`]).
//!
//! Either way the handler ends up behind an `Arc<dyn ScalarHandler>` in a
//! name-keyed map, and the engine's user-data pointer references the same
//! allocation. The thunk the engine calls is monomorphized per handler type.
//!
//! # Send + Sync
//!
//! A connection can move between threads, taking its registered functions
//! with it, so handlers must be `Send + Sync`.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::Arc;

use fsqlite_error::Result;
use rusqlite::{Connection, ffi};
use tracing::debug;

use crate::arity::{FromArgs, ScalarFn};
use crate::context::ValueContext;
use crate::engine::{self, Callbacks, canonical_name};
use crate::options::FunctionOptions;

/// Type-erased body of a scalar function.
pub trait ScalarHandler: Send + Sync + 'static {
    /// Handle one call: read arguments from `ctx` and emit a result.
    fn invoke(&self, ctx: &mut ValueContext<'_>);
}

/// Hand-written handler for the low-level path.
struct RawScalar<F>(F);

impl<F> ScalarHandler for RawScalar<F>
where
    F: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
{
    fn invoke(&self, ctx: &mut ValueContext<'_>) {
        (self.0)(ctx);
    }
}

/// Typed callable plus the argument tuple it was resolved against.
struct TypedScalar<F, Args> {
    func: F,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> ScalarHandler for TypedScalar<F, Args>
where
    F: ScalarFn<Args>,
    Args: FromArgs,
{
    fn invoke(&self, ctx: &mut ValueContext<'_>) {
        let args = Args::extract(ctx);
        let out = self.func.call(args);
        ctx.emit(out.into());
    }
}

/// Adapter the engine calls for every row.
unsafe extern "C" fn scalar_thunk<H: ScalarHandler>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // SAFETY: the engine guarantees `ctx`/`argv` for the duration of the
    // call; user data is the `Arc<H>` leaked at registration.
    unsafe {
        let mut ctx = ValueContext::from_raw(ctx, argc, argv);
        let handler = &*ctx.user_data().cast_const().cast::<H>();
        handler.invoke(&mut ctx);
    }
}

/// One entry of the scalar map.
#[derive(Clone)]
pub struct RegisteredScalar {
    pub name: String,
    /// Registered argument count (`-1` for variadic raw handlers).
    pub arity: i32,
    pub handler: Arc<dyn ScalarHandler>,
}

impl fmt::Debug for RegisteredScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredScalar")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Registers scalar functions on one connection.
///
/// Entries are keyed by name only: registering a name again replaces the
/// map entry, while the engine keys by `(name, arity)` and may keep an
/// older registration with a different arity alive on its own.
///
/// Registration takes `&mut self`; finish all registrations before the
/// connection is shared with concurrent queries.
pub struct FunctionRegistry<'conn> {
    conn: &'conn Connection,
    options: FunctionOptions,
    scalars: HashMap<String, RegisteredScalar>,
}

impl<'conn> FunctionRegistry<'conn> {
    /// Create an empty registry for `conn` with default options.
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_options(conn, FunctionOptions::default())
    }

    /// Create an empty registry whose registrations use `options`.
    #[must_use]
    pub fn with_options(conn: &'conn Connection, options: FunctionOptions) -> Self {
        Self {
            conn,
            options,
            scalars: HashMap::new(),
        }
    }

    /// Options applied to subsequent registrations.
    #[must_use]
    pub const fn options(&self) -> FunctionOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FunctionOptions) {
        self.options = options;
    }

    /// Register a hand-written handler taking `nargs` arguments.
    ///
    /// No marshalling happens: `handler` reads its own arguments and must
    /// emit its own result. `nargs = -1` accepts any argument count.
    pub fn create_raw<F>(&mut self, name: &str, nargs: i32, handler: F) -> Result<()>
    where
        F: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
    {
        self.install(name, nargs, RawScalar(handler))
    }

    /// Register a typed callable; arity comes from its signature.
    ///
    /// ```ignore
    /// registry.create("add2", |a: i64, b: i64| a + b)?;
    /// ```
    pub fn create<Args, F>(&mut self, name: &str, func: F) -> Result<()>
    where
        Args: FromArgs,
        F: ScalarFn<Args>,
    {
        let handler = TypedScalar {
            func,
            _args: PhantomData::<fn(Args)>,
        };
        self.install(name, Args::ARITY, handler)
    }

    fn install<H: ScalarHandler>(&mut self, name: &str, nargs: i32, handler: H) -> Result<()> {
        let holder = Arc::new(handler);
        engine::register(
            self.conn,
            name,
            nargs,
            self.options,
            &holder,
            Callbacks::Scalar(scalar_thunk::<H>),
        )?;
        let entry = RegisteredScalar {
            name: name.to_owned(),
            arity: nargs,
            handler: holder,
        };
        if let Some(previous) = self.scalars.insert(canonical_name(name), entry) {
            debug!(
                target: "fsqlite.func",
                name,
                previous_arity = previous.arity,
                "scalar entry replaced"
            );
        }
        Ok(())
    }

    /// The current entry for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredScalar> {
        self.scalars.get(&canonical_name(name))
    }

    /// Whether a function named `name` was registered here.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.scalars.contains_key(&canonical_name(name))
    }

    /// Arity of the most recent registration of `name`.
    #[must_use]
    pub fn arity(&self, name: &str) -> Option<i32> {
        self.get(name).map(|entry| entry.arity)
    }

    /// Registered names, as given at registration.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scalars.values().map(|entry| entry.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("options", &self.options)
            .field("scalars", &self.scalars.values().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
