//! At-most-one construction under concurrency.

use ferrous_web::{
    Args, AsyncContext, Dependency, DiError, Executor, Method, Request, Route, RouteTable,
    SchedulerContext, ServiceCollection,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct SlowEngine {
    serial: usize,
}

fn slow_engine_collection(constructions: Arc<AtomicUsize>) -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services.add_singleton_async_factory::<SlowEngine, _, _>(move |_cx: AsyncContext| {
        let constructions = constructions.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let serial = constructions.fetch_add(1, Ordering::SeqCst);
            Ok(SlowEngine { serial })
        }
    });
    services
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_first_resolutions_construct_once() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let provider = slow_engine_collection(constructions.clone()).build();

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let provider = provider.clone();
        tasks.push(tokio::spawn(async move { provider.get_async::<SlowEngine>().await }));
    }

    let mut instances = Vec::new();
    for task in tasks {
        instances.push(task.await.unwrap().unwrap());
    }

    assert_eq!(constructions.load(Ordering::SeqCst), 1, "constructor ran more than once");
    for instance in &instances {
        assert!(Arc::ptr_eq(instance, &instances[0]), "callers got different instances");
        assert_eq!(instance.serial, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_requests_with_singleton_dependency() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let provider = slow_engine_collection(constructions.clone()).build();

    let routes = RouteTable::new().route(
        Route::get("/engine")
            .dependency(Dependency::service::<SlowEngine>())
            .handler(|args: Args| async move {
                let engine = args.service::<SlowEngine>()?;
                Ok(json!({ "serial": engine.serial }))
            }),
    );
    let executor = Arc::new(Executor::new(provider, routes, SchedulerContext::new()));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let executor = executor.clone();
        tasks.push(tokio::spawn(async move {
            executor.handle(Request::new(Method::Get, "/engine")).await
        }));
    }

    for task in tasks {
        let response = task.await.unwrap();
        assert_eq!(response.status, 200, "a concurrent first request failed");
        assert_eq!(response.body["serial"], 0);
    }
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_construction_failure_is_cached_and_resettable() {
    struct Broken;

    let should_fail = Arc::new(AtomicBool::new(true));
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut services = ServiceCollection::new();
    {
        let should_fail = should_fail.clone();
        let attempts = attempts.clone();
        services.add_singleton_async_factory::<Broken, _, _>(move |_cx| {
            let should_fail = should_fail.clone();
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                if should_fail.load(Ordering::SeqCst) {
                    Err(DiError::NotFound("upstream not reachable"))
                } else {
                    Ok(Broken)
                }
            }
        });
    }
    let provider = services.build();

    // Concurrent first resolutions: the factory runs once and everyone
    // sees the same cached construction fault.
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let provider = provider.clone();
        tasks.push(tokio::spawn(async move { provider.get_async::<Broken>().await }));
    }
    for task in tasks {
        assert!(matches!(task.await.unwrap(), Err(DiError::Construction { .. })));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // Still cached: no retry storm.
    assert!(matches!(provider.get_async::<Broken>().await, Err(DiError::Construction { .. })));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // Explicit reset, fixed upstream: construction succeeds.
    should_fail.store(false, Ordering::SeqCst);
    assert!(provider.reset_singleton::<Broken>());
    assert!(provider.get_async::<Broken>().await.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sync_singletons_race_free_across_threads() {
    struct Counterd {
        #[allow(dead_code)]
        n: usize,
    }

    let constructions = Arc::new(AtomicUsize::new(0));
    let mut services = ServiceCollection::new();
    {
        let constructions = constructions.clone();
        services.add_singleton_factory::<Counterd, _>(move |_| {
            // Widen the race window a little.
            std::thread::sleep(Duration::from_millis(5));
            Counterd { n: constructions.fetch_add(1, Ordering::SeqCst) }
        });
    }
    let provider = services.build();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let provider = provider.clone();
        handles.push(std::thread::spawn(move || {
            use ferrous_web::Resolver;
            provider.get_required::<Counterd>()
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}
