use ferrous_web::{Resolver, ServiceCollection};
use std::sync::{Arc, Mutex};

#[test]
fn test_scoped_lifetime() {
    #[derive(Debug, Clone)]
    struct RequestState {
        id: String,
    }

    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<RequestState, _>(move |_| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        RequestState { id: format!("req-{}", *c) }
    });

    let sp = sc.build();

    let scope1 = sp.create_scope();
    let scope2 = sp.create_scope();

    let ctx1a = scope1.get_required::<RequestState>();
    let ctx1b = scope1.get_required::<RequestState>();
    let ctx2a = scope2.get_required::<RequestState>();

    // Same instance within same scope
    assert!(Arc::ptr_eq(&ctx1a, &ctx1b));
    // Different instances across scopes
    assert!(!Arc::ptr_eq(&ctx1a, &ctx2a));

    assert_eq!(ctx1a.id, "req-1");
    assert_eq!(ctx2a.id, "req-2");
}

#[test]
fn test_cannot_resolve_scoped_from_root() {
    struct ScopedService;

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<ScopedService, _>(|_| ScopedService);

    let sp = sc.build();

    let result = sp.get::<ScopedService>();
    assert!(result.is_err(), "Expected error when resolving scoped service from root");
}

#[test]
fn test_scoped_with_singleton_dependency() {
    struct Database {
        connection: String,
    }

    struct Repository {
        db: Arc<Database>,
        scope_id: String,
    }

    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_singleton(Database { connection: "postgres://localhost".to_string() });
    sc.add_scoped_factory::<Repository, _>(move |r| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        Repository {
            db: r.get_required::<Database>(),
            scope_id: format!("scope-{}", *c),
        }
    });

    let sp = sc.build();

    let scope1 = sp.create_scope();
    let scope2 = sp.create_scope();

    let repo1 = scope1.get_required::<Repository>();
    let repo2 = scope2.get_required::<Repository>();

    assert!(!Arc::ptr_eq(&repo1, &repo2));
    assert_eq!(repo1.scope_id, "scope-1");
    assert_eq!(repo2.scope_id, "scope-2");

    // Same database instance (singleton)
    assert!(Arc::ptr_eq(&repo1.db, &repo2.db));
    assert_eq!(repo1.db.connection, "postgres://localhost");
}

#[test]
fn test_scoped_depending_on_scoped() {
    struct UserState {
        user_id: String,
    }

    struct RequestHandler {
        user: Arc<UserState>,
    }

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<UserState, _>(|_| UserState { user_id: "user-9".to_string() });
    sc.add_scoped_factory::<RequestHandler, _>(|r| RequestHandler {
        user: r.get_required::<UserState>(),
    });

    let sp = sc.build();
    let scope = sp.create_scope();

    let handler = scope.get_required::<RequestHandler>();
    let user = scope.get_required::<UserState>();

    // The handler's user state is the scope's user state.
    assert!(Arc::ptr_eq(&handler.user, &user));
    assert_eq!(handler.user.user_id, "user-9");
}

#[test]
fn test_scope_clone_shares_state() {
    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<String, _>(move |_| {
        let mut c = counter_clone.lock().unwrap();
        *c += 1;
        format!("scoped-{}", *c)
    });

    let sp = sc.build();
    let scope = sp.create_scope();
    let handle = scope.clone();

    let a = scope.get_required::<String>();
    let b = handle.get_required::<String>();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(*counter.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_async_scoped_factory_caches_per_scope() {
    struct Tx {
        id: usize,
    }

    let counter = Arc::new(Mutex::new(0));
    let counter_clone = counter.clone();

    let mut sc = ServiceCollection::new();
    sc.add_scoped_async_factory::<Tx, _, _>(move |_cx| {
        let counter = counter_clone.clone();
        async move {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            let mut c = counter.lock().unwrap();
            *c += 1;
            Ok(Tx { id: *c })
        }
    });

    let sp = sc.build();
    let scope1 = sp.create_scope();
    let scope2 = sp.create_scope();

    let a = scope1.get_async::<Tx>().await.unwrap();
    let b = scope1.get_async::<Tx>().await.unwrap();
    let c = scope2.get_async::<Tx>().await.unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(a.id, 1);
    assert_eq!(c.id, 2);
}
