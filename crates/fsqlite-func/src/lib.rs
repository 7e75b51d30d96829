//! Native scalar and aggregate SQL functions for SQLite connections.
//!
//! Handlers are plain Rust closures or accumulator types. Their arity and
//! argument types come from their signatures, and their return values are
//! converted to SQL results automatically:
//!
//! ```ignore
//! let conn = rusqlite::Connection::open_in_memory()?;
//! let mut functions = FunctionRegistry::new(&conn);
//! functions.create("add2", |a: i64, b: i64| a + b)?;
//!
//! let mut aggregates = AggregateRegistry::new(&conn);
//! aggregates.create::<Counter, ()>("counter")?;
//! ```
//!
//! Both registries also expose a raw path taking `Fn(&mut ValueContext)`
//! handlers, which can read any number of arguments and emit any result.
//!
//! Registration is name-keyed on the Rust side: registering an existing
//! name (case-insensitively) replaces the entry. The engine keys by
//! `(name, arity)`, so an overload at a different arity stays callable
//! in SQL until the connection closes.

pub mod aggregate;
pub mod arity;
pub mod context;
mod engine;
pub mod options;
pub mod scalar;
pub mod slot;
pub mod value;

pub use aggregate::{Accumulator, AggregateHandler, AggregateRegistry, RegisteredAggregate};
pub use arity::{FromArgs, MAX_ARITY, ScalarFn};
pub use context::ValueContext;
pub use options::FunctionOptions;
pub use scalar::{FunctionRegistry, RegisteredScalar, ScalarHandler};
pub use slot::{AccumulatorSlot, SLOT_ALIGN, SlotState};
pub use value::{FromArg, ResultValue, Value, ValueType};
