//! End-to-end registration scenarios against a live in-memory database.
//!
//! Every case registers handlers through the public registries and checks
//! what SQL actually observes.

use fsqlite_error::{ErrorCode, FrankenError};
use fsqlite_func::{
    Accumulator, AggregateRegistry, FunctionOptions, FunctionRegistry, ValueContext, ValueType,
};
use rusqlite::Connection;

fn open() -> Connection {
    Connection::open_in_memory().expect("open in-memory db")
}

fn query_i64(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).expect("query")
}

#[derive(Default)]
struct Counter(i64);

impl Accumulator<()> for Counter {
    type Output = i64;

    fn step(&mut self, (): ()) {
        self.0 += 1;
    }

    fn finish(self) -> i64 {
        self.0
    }
}

#[test]
fn test_typed_scalar_add2() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    functions
        .create("add2", |a: i64, b: i64| a + b)
        .expect("register add2");

    assert_eq!(query_i64(&conn, "SELECT add2(3, 4)"), 7);
    assert_eq!(functions.arity("ADD2"), Some(2));
}

#[test]
fn test_zero_arg_counter_aggregate() {
    let conn = open();
    conn.execute_batch(
        "CREATE TABLE five(x);
         INSERT INTO five VALUES (1), (2), (3), (4), (5);",
    )
    .expect("seed");

    let mut aggregates = AggregateRegistry::new(&conn);
    aggregates
        .create::<Counter, ()>("counter")
        .expect("register counter");

    assert_eq!(query_i64(&conn, "SELECT counter() FROM five"), 5);
    assert_eq!(aggregates.arity("counter"), Some(0));
}

#[test]
fn test_null_argument_yields_null_typed() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    functions
        .create("twice", |x: Option<i64>| x.map(|v| v * 2))
        .expect("register twice");

    let out: Option<i64> = conn
        .query_row("SELECT twice(NULL)", [], |r| r.get(0))
        .expect("query");
    assert_eq!(out, None);
    assert_eq!(query_i64(&conn, "SELECT twice(21)"), 42);
}

#[test]
fn test_null_argument_yields_null_raw() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    functions
        .create_raw("twice_raw", 1, |ctx: &mut ValueContext<'_>| {
            if ctx.args_type(0) == ValueType::Null {
                ctx.result_null();
            } else {
                let v = ctx.get_int64(0);
                ctx.result(v * 2);
            }
        })
        .expect("register twice_raw");

    let out: Option<i64> = conn
        .query_row("SELECT twice_raw(NULL)", [], |r| r.get(0))
        .expect("query");
    assert_eq!(out, None);
    assert_eq!(query_i64(&conn, "SELECT typeof(twice_raw(NULL)) = 'null'"), 1);
}

#[test]
fn test_second_registration_wins() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    functions
        .create("pick", |x: i64| x + 1)
        .expect("first registration");
    assert_eq!(query_i64(&conn, "SELECT pick(10)"), 11);

    functions
        .create("pick", |x: i64| x + 100)
        .expect("second registration");
    assert_eq!(query_i64(&conn, "SELECT pick(10)"), 110);
    assert_eq!(functions.len(), 1);
}

#[test]
fn test_registries_share_a_connection() {
    let conn = open();
    conn.execute_batch(
        "CREATE TABLE t(v INTEGER);
         INSERT INTO t VALUES (1), (2), (3);",
    )
    .expect("seed");

    let mut functions = FunctionRegistry::with_options(
        &conn,
        FunctionOptions::new().deterministic(true),
    );
    let mut aggregates = AggregateRegistry::new(&conn);
    functions
        .create("sq", |x: i64| x * x)
        .expect("register sq");
    aggregates
        .create::<Counter, ()>("counter")
        .expect("register counter");

    assert_eq!(query_i64(&conn, "SELECT sum(sq(v)) FROM t"), 14);
    assert_eq!(query_i64(&conn, "SELECT counter() FROM t WHERE sq(v) > 1"), 2);
}

#[test]
fn test_handler_error_becomes_statement_error() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    functions
        .create("checked_sqrt", |x: f64| {
            if x < 0.0 {
                Err(format!("checked_sqrt: negative input {x}"))
            } else {
                Ok(x.sqrt())
            }
        })
        .expect("register checked_sqrt");

    let ok: f64 = conn
        .query_row("SELECT checked_sqrt(16.0)", [], |r| r.get(0))
        .expect("query");
    assert!((ok - 4.0).abs() < f64::EPSILON);

    let err = conn
        .query_row("SELECT checked_sqrt(-1.0)", [], |r| r.get::<_, f64>(0))
        .expect_err("negative input must fail");
    assert!(
        err.to_string().contains("negative input"),
        "unexpected error: {err}"
    );
}

#[test]
fn test_registration_failure_reports_engine_code() {
    let conn = open();
    let mut functions = FunctionRegistry::new(&conn);
    let long_name = "f".repeat(300);
    let err = functions
        .create(&long_name, |x: i64| x)
        .expect_err("over-long name must be refused");

    match &err {
        FrankenError::Registration { name, arity, .. } => {
            assert_eq!(name, &long_name);
            assert_eq!(*arity, 1);
        }
        other => panic!("expected registration error, got {other:?}"),
    }
    assert_eq!(err.error_code(), ErrorCode::Misuse);
    assert!(functions.is_empty());
}
