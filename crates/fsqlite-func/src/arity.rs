//! Compile-time arity dispatch.
//!
//! The engine needs the argument count at registration time, so arity and
//! parameter types are resolved from the callable's signature rather than
//! at call time. Tuples `()` through `(P1, .., P5)` implement [`FromArgs`];
//! plain `Fn(P1, .., Pn) -> R` callables implement [`ScalarFn`] for the
//! matching tuple. Five arguments is the supported maximum: wider
//! functions go through the low-level `create_raw` path.

use crate::context::ValueContext;
use crate::value::{FromArg, ResultValue};

/// Largest arity the typed adapters support.
pub const MAX_ARITY: usize = 5;

/// A fixed-size argument list extracted positionally from a call.
///
/// Extraction reads argument 0 first and argument `ARITY - 1` last.
pub trait FromArgs: Sized + 'static {
    /// Argument count registered with the engine.
    const ARITY: i32;

    fn extract(ctx: &ValueContext<'_>) -> Self;
}

/// A typed scalar callable taking the argument tuple `Args`.
pub trait ScalarFn<Args: FromArgs>: Send + Sync + 'static {
    type Output: Into<ResultValue<'static>>;

    fn call(&self, args: Args) -> Self::Output;
}

macro_rules! impl_arity {
    ($arity:literal; $($ty:ident $var:ident $idx:literal),*) => {
        impl<$($ty: FromArg + 'static),*> FromArgs for ($($ty,)*) {
            const ARITY: i32 = $arity;

            #[allow(unused_variables)]
            fn extract(ctx: &ValueContext<'_>) -> Self {
                // Tuple fields evaluate left to right.
                ($(ctx.get::<$ty>($idx),)*)
            }
        }

        impl<Func, Ret, $($ty),*> ScalarFn<($($ty,)*)> for Func
        where
            Func: Fn($($ty),*) -> Ret + Send + Sync + 'static,
            Ret: Into<ResultValue<'static>>,
            $($ty: FromArg + 'static,)*
        {
            type Output = Ret;

            fn call(&self, ($($var,)*): ($($ty,)*)) -> Ret {
                self($($var),*)
            }
        }
    };
}

impl_arity!(0;);
impl_arity!(1; P1 p1 0);
impl_arity!(2; P1 p1 0, P2 p2 1);
impl_arity!(3; P1 p1 0, P2 p2 1, P3 p3 2);
impl_arity!(4; P1 p1 0, P2 p2 1, P3 p3 2, P4 p4 3);
impl_arity!(5; P1 p1 0, P2 p2 1, P3 p3 2, P4 p4 3, P5 p5 4);

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rusqlite::Connection;

    use super::*;
    use crate::FunctionRegistry;

    fn arity_of<Args: FromArgs, F: ScalarFn<Args>>(_f: &F) -> i32 {
        Args::ARITY
    }

    #[test]
    fn test_arity_resolved_from_signature() {
        assert_eq!(arity_of(&|| 1_i64), 0);
        assert_eq!(arity_of(&|a: i64| a), 1);
        assert_eq!(arity_of(&|a: i64, b: f64| a as f64 + b), 2);
        assert_eq!(arity_of(&|_: String, _: Vec<u8>, _: bool| ()), 3);
        assert_eq!(arity_of(&|_: i32, _: i32, _: i32, _: i32| 0_i32), 4);
        assert_eq!(
            arity_of(&|_: i64, _: i64, _: i64, _: i64, _: i64| 0_i64),
            i32::try_from(MAX_ARITY).unwrap()
        );
    }

    #[test]
    fn test_call_applies_tuple_in_order() {
        let f = |a: i64, b: i64, c: i64| a * 100 + b * 10 + c;
        assert_eq!(ScalarFn::call(&f, (1, 2, 3)), 123);
    }

    thread_local! {
        static READS: RefCell<Vec<i64>> = const { RefCell::new(Vec::new()) };
    }

    /// Records every extraction so the read order can be checked.
    struct Tracked(i64);

    impl FromArg for Tracked {
        fn from_arg(ctx: &ValueContext<'_>, idx: usize) -> Self {
            READS.with(|r| r.borrow_mut().push(idx as i64));
            Self(ctx.get_int64(idx))
        }
    }

    #[test]
    fn test_extraction_order_is_positional() {
        let conn = Connection::open_in_memory().unwrap();
        let mut registry = FunctionRegistry::new(&conn);
        registry
            .create(
                "order5",
                |a: Tracked, b: Tracked, c: Tracked, d: Tracked, e: Tracked| {
                    a.0 + b.0 + c.0 + d.0 + e.0
                },
            )
            .unwrap();

        READS.with(|r| r.borrow_mut().clear());
        let sum: i64 = conn
            .query_row("SELECT order5(1, 2, 3, 4, 5)", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sum, 15);
        assert_eq!(READS.with(|r| r.borrow().clone()), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_every_arity_registers_and_runs() {
        let conn = Connection::open_in_memory().unwrap();
        let mut registry = FunctionRegistry::new(&conn);
        registry.create("a0", || 10_i64).unwrap();
        registry.create("a1", |a: i64| a).unwrap();
        registry.create("a2", |a: i64, b: i64| a + b).unwrap();
        registry.create("a3", |a: i64, b: i64, c: i64| a + b + c).unwrap();
        registry
            .create("a4", |a: i64, b: i64, c: i64, d: i64| a + b + c + d)
            .unwrap();
        registry
            .create("a5", |a: i64, b: i64, c: i64, d: i64, e: i64| {
                a + b + c + d + e
            })
            .unwrap();

        let row: Vec<i64> = conn
            .query_row(
                "SELECT a0(), a1(1), a2(1, 2), a3(1, 2, 3), a4(1, 2, 3, 4), a5(1, 2, 3, 4, 5)",
                [],
                |r| (0..6_usize).map(|i| r.get(i)).collect(),
            )
            .unwrap();
        assert_eq!(row, vec![10, 1, 3, 6, 10, 15]);

        for (name, arity) in [("A0", 0), ("a1", 1), ("a2", 2), ("a3", 3), ("a4", 4), ("a5", 5)] {
            assert_eq!(registry.arity(name), Some(arity), "{name}");
        }

        // Wrong argument count is rejected by the engine at prepare time.
        assert!(conn.query_row("SELECT a2(1)", [], |r| r.get::<_, i64>(0)).is_err());
    }
}
