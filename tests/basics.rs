use ferrous_web::{DiError, Resolver, ServiceCollection};
use std::sync::{Arc, Mutex};

#[test]
fn test_concrete_singleton() {
    let mut sc = ServiceCollection::new();
    sc.add_singleton(42usize);
    sc.add_singleton("hello".to_string());

    let sp = sc.build();

    let num1 = sp.get_required::<usize>();
    let num2 = sp.get_required::<usize>();
    let str1 = sp.get_required::<String>();
    let str2 = sp.get_required::<String>();

    assert_eq!(*num1, 42);
    assert_eq!(*str1, "hello");
    assert!(Arc::ptr_eq(&num1, &num2)); // Same instance
    assert!(Arc::ptr_eq(&str1, &str2)); // Same instance
}

#[test]
fn test_factory_with_dependencies() {
    #[derive(Debug)]
    struct Config {
        port: u16,
    }

    #[derive(Debug)]
    struct Server {
        config: Arc<Config>,
        name: String,
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton(Config { port: 8080 });
    sc.add_singleton_factory::<Server, _>(|r| Server {
        config: r.get_required::<Config>(),
        name: "MyServer".to_string(),
    });

    let sp = sc.build();
    let server = sp.get_required::<Server>();

    assert_eq!(server.config.port, 8080);
    assert_eq!(server.name, "MyServer");
}

#[test]
fn test_transient_creates_new_instances() {
    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<String, _>(move |_| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        format!("instance-{}", *c)
    });

    let sp = sc.build();
    let a = sp.get_required::<String>();
    let b = sp.get_required::<String>();

    assert_eq!(a.as_str(), "instance-1");
    assert_eq!(b.as_str(), "instance-2");
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn test_trait_resolution() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct EnglishGreeter;
    impl Greeter for EnglishGreeter {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton_trait::<dyn Greeter>(Arc::new(EnglishGreeter));

    let sp = sc.build();
    let greeter = sp.get_required_trait::<dyn Greeter>();
    assert_eq!(greeter.greet(), "hello");
}

#[test]
fn test_named_registrations_coexist() {
    let mut sc = ServiceCollection::new();
    sc.add_singleton(8080u32);
    sc.add_named_singleton("admin_port", 9090u32);
    sc.add_named_singleton("metrics_port", 9100u32);

    let sp = sc.build();

    assert_eq!(*sp.get_required::<u32>(), 8080);
    assert_eq!(*sp.get_named_required::<u32>("admin_port"), 9090);
    assert_eq!(*sp.get_named_required::<u32>("metrics_port"), 9100);
}

#[test]
fn test_not_found_error() {
    let sp = ServiceCollection::new().build();
    match sp.get::<String>() {
        Err(DiError::NotFound(name)) => assert_eq!(name, "alloc::string::String"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_last_registration_wins() {
    let mut sc = ServiceCollection::new();
    sc.add_singleton(1u8);
    sc.add_singleton(2u8);

    let sp = sc.build();
    assert_eq!(*sp.get_required::<u8>(), 2);
}

#[test]
fn test_override_guard_substitutes_and_reverts() {
    struct Mailer {
        endpoint: String,
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton(Mailer { endpoint: "smtp://real".to_string() });
    let sp = sc.build();

    assert_eq!(sp.get_required::<Mailer>().endpoint, "smtp://real");

    {
        let _guard = sp.override_instance(Mailer { endpoint: "smtp://stub".to_string() });
        assert_eq!(sp.get_required::<Mailer>().endpoint, "smtp://stub");

        // Scopes see the same override.
        let scope = sp.create_scope();
        assert_eq!(scope.get_required::<Mailer>().endpoint, "smtp://stub");
    }

    assert_eq!(sp.get_required::<Mailer>().endpoint, "smtp://real");
}

#[test]
fn test_override_trait() {
    trait Clock: Send + Sync {
        fn now_ms(&self) -> u64;
    }

    struct RealClock;
    impl Clock for RealClock {
        fn now_ms(&self) -> u64 {
            1
        }
    }

    struct FrozenClock;
    impl Clock for FrozenClock {
        fn now_ms(&self) -> u64 {
            999
        }
    }

    let mut sc = ServiceCollection::new();
    sc.add_singleton_trait::<dyn Clock>(Arc::new(RealClock));
    let sp = sc.build();

    {
        let _guard = sp.override_trait::<dyn Clock>(Arc::new(FrozenClock));
        assert_eq!(sp.get_required_trait::<dyn Clock>().now_ms(), 999);
    }
    assert_eq!(sp.get_required_trait::<dyn Clock>().now_ms(), 1);
}

#[test]
fn test_construction_failure_is_cached_until_reset() {
    struct Flaky;

    let attempts = Arc::new(Mutex::new(0));
    let attempts_clone = attempts.clone();

    let mut sc = ServiceCollection::new();
    sc.try_add_singleton_factory::<Flaky, _>(move |_| {
        let mut a = attempts_clone.lock().unwrap();
        *a += 1;
        if *a == 1 {
            Err(DiError::NotFound("upstream"))
        } else {
            Ok(Flaky)
        }
    });

    let sp = sc.build();

    // First resolution fails and the failure is cached.
    assert!(matches!(sp.get::<Flaky>(), Err(DiError::Construction { .. })));
    // Re-raised without re-running the factory.
    assert!(matches!(sp.get::<Flaky>(), Err(DiError::Construction { .. })));
    assert_eq!(*attempts.lock().unwrap(), 1);

    // Explicit reset allows a retry.
    assert!(sp.reset_singleton::<Flaky>());
    assert!(sp.get::<Flaky>().is_ok());
    assert_eq!(*attempts.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_async_only_registration_rejects_sync_resolution() {
    struct Pool;

    let mut sc = ServiceCollection::new();
    sc.add_singleton_async_factory::<Pool, _, _>(|_cx| async { Ok(Pool) });
    let sp = sc.build();

    assert!(matches!(sp.get::<Pool>(), Err(DiError::AsyncOnly(_))));

    // Once built through the async path, the sync path can read the cache.
    let _ = sp.get_async::<Pool>().await.unwrap();
    assert!(sp.get::<Pool>().is_ok());
}
