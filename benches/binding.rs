//! Performance benchmarks for the binding core.
//!
//! Measures the hot paths a running script exercises continuously:
//! overload dispatch, proxy property access, and value marshalling.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use kubescript::prelude::*;
use kubescript::{host_type, Handle, Value};

#[derive(Default)]
struct Point {
    x: i64,
    y: i64,
}

impl Point {
    fn sum(&self) -> i64 {
        self.x + self.y
    }
}

host_type! {
    impl Point {
        fields { x: i64, y: i64 }
        methods {
            fn sum(&self) -> i64;
        }
    }
}

struct InertEngine;

impl ScriptEngine for InertEngine {
    fn eval(&mut self, _execution: &Execution<'_>) -> Result<Value, ScriptError> {
        Ok(Value::Undefined)
    }
}

fn runtime() -> Runtime {
    let mut builder = RegistryBuilder::new();
    builder
        .register_type::<Point>()
        .js_namespace("geometry")
        .fields(["x", "y"])
        .methods(["sum"])
        .constructor(|x: i64, y: i64| Point { x, y });
    builder.register_fn("add", |a: i64, b: i64| a + b);
    builder.register_fn("add", |a: i64, b: i64, c: i64| a + b + c);
    Runtime::new(builder, Box::new(InertEngine)).expect("registrations are valid")
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = runtime();
    let Some(Value::HostFunction(add)) = rt.globals().get("add") else {
        panic!("add should be registered");
    };
    let args = [Value::Int(2), Value::Int(3)];

    c.bench_function("dispatch_overloaded_call", |b| {
        b.iter(|| add.call(black_box(&args)).unwrap())
    });
}

fn bench_property_access(c: &mut Criterion) {
    let rt = runtime();
    let cx = rt.ctx();
    let handle = Handle::new(Point { x: 1, y: 2 });
    let Value::HostObject(proxy) = cx.to_value(handle).unwrap() else {
        panic!("expected a proxy");
    };

    c.bench_function("proxy_get_field", |b| {
        b.iter(|| proxy.get(black_box("x")).unwrap())
    });
    c.bench_function("proxy_set_field", |b| {
        b.iter(|| proxy.set(black_box("x"), Value::Int(5)).unwrap())
    });
}

fn bench_wrap_identity(c: &mut Criterion) {
    let rt = runtime();
    let cx = rt.ctx();
    let handle = Handle::new(Point { x: 1, y: 2 });
    let keep = cx.to_value(handle.clone()).unwrap();

    c.bench_function("wrap_deduplicated_handle", |b| {
        b.iter(|| cx.to_value(black_box(handle.clone())).unwrap())
    });
    drop(keep);
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_property_access,
    bench_wrap_identity
);
criterion_main!(benches);
