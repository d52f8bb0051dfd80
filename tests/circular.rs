use ferrous_web::{DiError, Resolver, ServiceCollection};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Cycles detected mid-factory surface as a panic from `get_required`
/// whose message carries the circular path.
fn assert_panics_with_cycle<F>(f: F, expected_elements: &[&str])
where
    F: FnOnce(),
{
    let err = catch_unwind(AssertUnwindSafe(f)).expect_err("expected circular panic");
    let message = if let Some(msg) = err.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = err.downcast_ref::<&'static str>() {
        msg.to_string()
    } else {
        panic!("unrecognized panic payload");
    };
    for element in expected_elements {
        assert!(
            message.contains(element),
            "panic message missing {element:?}; got: {message}"
        );
    }
}

#[test]
fn test_self_circular_dependency() {
    struct SelfReferencing {
        #[allow(dead_code)]
        inner: Arc<SelfReferencing>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton_factory::<SelfReferencing, _>(|r| SelfReferencing {
        inner: r.get_required::<SelfReferencing>(),
    });

    let sp = sc.build();
    assert_panics_with_cycle(
        || {
            let _ = sp.get_required::<SelfReferencing>();
        },
        &["SelfReferencing", "Circular"],
    );
}

#[test]
fn test_two_service_cycle() {
    struct ServiceA {
        #[allow(dead_code)]
        b: Arc<ServiceB>,
    }
    struct ServiceB {
        #[allow(dead_code)]
        a: Arc<ServiceA>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton_factory::<ServiceA, _>(|r| ServiceA { b: r.get_required::<ServiceB>() });
    sc.add_singleton_factory::<ServiceB, _>(|r| ServiceB { a: r.get_required::<ServiceA>() });

    let sp = sc.build();
    assert_panics_with_cycle(
        || {
            let _ = sp.get_required::<ServiceA>();
        },
        &["ServiceA", "ServiceB"],
    );
}

#[test]
fn test_resolution_recovers_after_cycle_error() {
    struct Looping {
        #[allow(dead_code)]
        inner: Arc<Looping>,
    }
    struct Healthy;

    let mut sc = ServiceCollection::new();
    sc.add_singleton_factory::<Looping, _>(|r| Looping {
        inner: r.get_required::<Looping>(),
    });
    sc.add_singleton(Healthy);

    let sp = sc.build();
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let _ = sp.get_required::<Looping>();
    }));

    // The thread-local resolution stack is clean again.
    assert!(sp.get::<Healthy>().is_ok());
}

#[tokio::test]
async fn test_async_cycle_returns_error() {
    #[derive(Debug)]
    struct AsyncA;
    #[derive(Debug)]
    struct AsyncB;

    let mut sc = ServiceCollection::new();
    sc.add_singleton_async_factory::<AsyncA, _, _>(|cx| async move {
        let _b = cx.get_async::<AsyncB>().await?;
        Ok(AsyncA)
    });
    sc.add_singleton_async_factory::<AsyncB, _, _>(|cx| async move {
        let _a = cx.get_async::<AsyncA>().await?;
        Ok(AsyncB)
    });

    let sp = sc.build();
    // The async path threads an explicit stack, so the cycle comes back
    // as a construction failure wrapping the circular error.
    let err = sp.get_async::<AsyncA>().await.unwrap_err();
    match err {
        DiError::Construction { message, .. } => {
            assert!(message.contains("Circular"), "unexpected message: {message}");
        }
        other => panic!("expected construction failure, got {other:?}"),
    }
}
