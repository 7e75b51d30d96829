//! Aggregate function registration.
//!
//! Aggregate functions accumulate a result across multiple rows (e.g.
//! `SUM`, `COUNT`, `AVG`). Each GROUP BY bucket gets its own accumulator,
//! stored in memory the engine allocates for that bucket.
//!
//! # State Lifecycle
//!
//! 1. The first step call on a bucket default-constructs the accumulator
//!    in the bucket's [`AccumulatorSlot`].
//! 2. [`Accumulator::step`] runs once per row with the typed arguments.
//! 3. The finish call moves the accumulator out, emits
//!    [`Accumulator::finish`], and the value drops. The engine then frees
//!    the bucket memory.
//!
//! The engine calls finish exactly once per bucket after its last step;
//! grouping itself is entirely the engine's business.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::sync::Arc;

use fsqlite_error::Result;
use rusqlite::{Connection, ffi};
use tracing::{debug, trace};

use crate::arity::FromArgs;
use crate::context::ValueContext;
use crate::engine::{self, Callbacks, canonical_name};
use crate::options::FunctionOptions;
use crate::slot::AccumulatorSlot;
use crate::value::ResultValue;

/// A per-bucket accumulator taking the argument tuple `Args`.
///
/// ```ignore
/// #[derive(Default)]
/// struct Sum(i64);
///
/// impl Accumulator<(i64,)> for Sum {
///     type Output = i64;
///     fn step(&mut self, (x,): (i64,)) { self.0 += x; }
///     fn finish(self) -> i64 { self.0 }
/// }
/// ```
///
/// Finishing a bucket that never saw a row (an aggregate over an empty
/// table without GROUP BY) finishes a `Default` accumulator.
pub trait Accumulator<Args: FromArgs>: Default + 'static {
    type Output: Into<ResultValue<'static>>;

    /// Fold one row into the accumulator.
    fn step(&mut self, args: Args);

    /// Produce the bucket's result, consuming the accumulator.
    fn finish(self) -> Self::Output;
}

/// Type-erased step/finish pair of an aggregate.
pub trait AggregateHandler: Send + Sync + 'static {
    fn step(&self, ctx: &mut ValueContext<'_>);
    fn finish(&self, ctx: &mut ValueContext<'_>);
}

/// Hand-written step/finish pair for the low-level path.
struct RawAggregate<S, F> {
    step: S,
    finish: F,
}

impl<S, F> AggregateHandler for RawAggregate<S, F>
where
    S: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
    F: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
{
    fn step(&self, ctx: &mut ValueContext<'_>) {
        (self.step)(ctx);
    }

    fn finish(&self, ctx: &mut ValueContext<'_>) {
        (self.finish)(ctx);
    }
}

/// Typed adapter binding accumulator `A` to the argument tuple `Args`.
struct TypedAggregate<A, Args>(PhantomData<fn() -> (A, Args)>);

impl<A, Args> AggregateHandler for TypedAggregate<A, Args>
where
    A: Accumulator<Args>,
    Args: FromArgs,
{
    fn step(&self, ctx: &mut ValueContext<'_>) {
        let Some(mut slot) = AccumulatorSlot::<A>::bind(ctx) else {
            ctx.result_error_nomem();
            return;
        };
        if !slot.state().is_live() {
            trace!(
                target: "fsqlite.func",
                steps = ctx.aggregate_count(),
                "first step on bucket"
            );
        }
        slot.step_with(|acc| {
            let args = Args::extract(ctx);
            acc.step(args);
        });
    }

    fn finish(&self, ctx: &mut ValueContext<'_>) {
        let Some(mut slot) = AccumulatorSlot::<A>::bind(ctx) else {
            ctx.result_error_nomem();
            return;
        };
        let acc = slot.take().unwrap_or_default();
        ctx.emit(acc.finish().into());
    }
}

unsafe extern "C" fn step_thunk<H: AggregateHandler>(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    // SAFETY: see `scalar_thunk`.
    unsafe {
        let mut ctx = ValueContext::from_raw(ctx, argc, argv);
        let handler = &*ctx.user_data().cast_const().cast::<H>();
        handler.step(&mut ctx);
    }
}

unsafe extern "C" fn finish_thunk<H: AggregateHandler>(ctx: *mut ffi::sqlite3_context) {
    // SAFETY: finish receives no arguments; the rest is as for step.
    unsafe {
        let mut ctx = ValueContext::from_raw(ctx, 0, std::ptr::null_mut());
        let handler = &*ctx.user_data().cast_const().cast::<H>();
        handler.finish(&mut ctx);
    }
}

/// One entry of the aggregate map.
#[derive(Clone)]
pub struct RegisteredAggregate {
    pub name: String,
    pub arity: i32,
    pub handler: Arc<dyn AggregateHandler>,
}

impl fmt::Debug for RegisteredAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredAggregate")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Registers aggregate functions on one connection.
///
/// Same ownership and replacement rules as
/// [`FunctionRegistry`](crate::FunctionRegistry), with a separate map.
pub struct AggregateRegistry<'conn> {
    conn: &'conn Connection,
    options: FunctionOptions,
    aggregates: HashMap<String, RegisteredAggregate>,
}

impl<'conn> AggregateRegistry<'conn> {
    #[must_use]
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_options(conn, FunctionOptions::default())
    }

    #[must_use]
    pub fn with_options(conn: &'conn Connection, options: FunctionOptions) -> Self {
        Self {
            conn,
            options,
            aggregates: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> FunctionOptions {
        self.options
    }

    pub fn set_options(&mut self, options: FunctionOptions) {
        self.options = options;
    }

    /// Register hand-written step and finish handlers.
    ///
    /// The handlers manage bucket state themselves through
    /// [`ValueContext::aggregate_data`].
    pub fn create_raw<S, F>(&mut self, name: &str, nargs: i32, step: S, finish: F) -> Result<()>
    where
        S: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
        F: Fn(&mut ValueContext<'_>) + Send + Sync + 'static,
    {
        self.install(name, nargs, RawAggregate { step, finish })
    }

    /// Register accumulator `A` taking the argument tuple `Args`.
    ///
    /// ```ignore
    /// registry.create::<Sum, (i64,)>("my_sum")?;
    /// ```
    pub fn create<A, Args>(&mut self, name: &str) -> Result<()>
    where
        A: Accumulator<Args>,
        Args: FromArgs,
    {
        self.install(name, Args::ARITY, TypedAggregate::<A, Args>(PhantomData))
    }

    fn install<H: AggregateHandler>(&mut self, name: &str, nargs: i32, handler: H) -> Result<()> {
        let holder = Arc::new(handler);
        engine::register(
            self.conn,
            name,
            nargs,
            self.options,
            &holder,
            Callbacks::Aggregate {
                step: step_thunk::<H>,
                finish: finish_thunk::<H>,
            },
        )?;
        let entry = RegisteredAggregate {
            name: name.to_owned(),
            arity: nargs,
            handler: holder,
        };
        if let Some(previous) = self.aggregates.insert(canonical_name(name), entry) {
            debug!(
                target: "fsqlite.func",
                name,
                previous_arity = previous.arity,
                "aggregate entry replaced"
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredAggregate> {
        self.aggregates.get(&canonical_name(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.aggregates.contains_key(&canonical_name(name))
    }

    #[must_use]
    pub fn arity(&self, name: &str) -> Option<i32> {
        self.get(name).map(|entry| entry.arity)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.aggregates.values().map(|entry| entry.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

impl fmt::Debug for AggregateRegistry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRegistry")
            .field("options", &self.options)
            .field("aggregates", &self.aggregates.values().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
