use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferrous_web::*;
use serde_json::json;
use std::sync::Arc;

// ===== Container micro benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let mut sc = ServiceCollection::new();
    sc.add_singleton(42u64);
    let sp = sc.build();

    // Prime the singleton
    let _ = sp.get::<u64>().unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = sp.get::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_scope_create_and_scoped_hit(c: &mut Criterion) {
    #[derive(Clone)]
    struct Service {
        data: [u8; 64],
    }

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<Service, _>(|_| Service { data: [0; 64] });
    let sp = sc.build();

    c.bench_function("scope_create", |b| {
        b.iter(|| {
            let scope = sp.create_scope();
            black_box(&scope);
        })
    });

    let scope = sp.create_scope();
    let _ = scope.get::<Service>().unwrap();
    c.bench_function("scoped_hit", |b| {
        b.iter(|| {
            let v = scope.get::<Service>().unwrap();
            black_box(&v.data);
        })
    });
}

fn bench_transient_with_dependency(c: &mut Criterion) {
    struct Config {
        port: u16,
    }
    struct Client {
        #[allow(dead_code)]
        config: Arc<Config>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton(Config { port: 8080 });
    sc.add_transient_factory::<Client, _>(|r| Client { config: r.get_required::<Config>() });
    let sp = sc.build();

    c.bench_function("transient_with_singleton_dep", |b| {
        b.iter(|| {
            let v = sp.get::<Client>().unwrap();
            black_box(v);
        })
    });
}

// ===== Pipeline benchmarks =====

fn bench_pipeline_handle(c: &mut Criterion) {
    struct Greeter {
        greeting: &'static str,
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    let mut sc = ServiceCollection::new();
    sc.add_singleton(Greeter { greeting: "hello" });
    let provider = sc.build();

    let routes = RouteTable::new().route(
        Route::get("/greet/:name")
            .dependency(Dependency::path("name", ParamKind::Str))
            .dependency(Dependency::service::<Greeter>())
            .handler(|args: Args| async move {
                let greeter = args.service::<Greeter>()?;
                Ok(json!(format!("{} {}", greeter.greeting, args.text("name")?)))
            }),
    );
    let executor = Executor::new(provider, routes, SchedulerContext::new());

    // Prime route metadata
    runtime.block_on(async {
        let _ = executor.handle(Request::new(Method::Get, "/greet/warmup")).await;
    });

    c.bench_function("pipeline_handle_get", |b| {
        b.iter(|| {
            let response = runtime
                .block_on(executor.handle(Request::new(Method::Get, "/greet/world")));
            black_box(response.status);
        })
    });
}

criterion_group!(
    benches,
    bench_singleton_hit,
    bench_scope_create_and_scoped_hit,
    bench_transient_with_dependency,
    bench_pipeline_handle
);
criterion_main!(benches);
