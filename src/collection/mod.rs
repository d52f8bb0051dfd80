//! Service collection for registering services and building providers.

use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;

use crate::error::DiResult;
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::observer::{DiObserver, Observers};
use crate::provider::{AsyncContext, ResolverContext, ServiceProvider};
use crate::registration::{AnyArc, Ctor, Registration, Registry};

/// Builder for service registrations.
///
/// Register services with their lifetimes here, then call [`build`] to get
/// a [`ServiceProvider`]. Registration is the only mutable phase; once the
/// provider is built, the registry is immutable and resolution is
/// lock-free on the fast paths.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct Database { connection_string: String }
/// struct UserService { db: Arc<Database> }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database {
///     connection_string: "postgres://localhost".to_string(),
/// });
/// services.add_transient_factory::<UserService, _>(|resolver| UserService {
///     db: resolver.get_required::<Database>(),
/// });
///
/// let provider = services.build();
/// let user_service = provider.get_required::<UserService>();
/// assert_eq!(user_service.db.connection_string, "postgres://localhost");
/// ```
///
/// [`build`]: ServiceCollection::build
pub struct ServiceCollection {
    registry: Registry,
    observers: Observers,
}

impl ServiceCollection {
    /// Creates a new empty service collection.
    pub fn new() -> Self {
        Self { registry: Registry::new(), observers: Observers::new() }
    }

    // ----- Concrete type registrations -----

    /// Registers a singleton instance shared across the entire worker.
    ///
    /// The instance is wrapped in an `Arc` immediately; every resolution
    /// returns the same instance.
    pub fn add_singleton<T: 'static + Send + Sync>(&mut self, value: T) -> &mut Self {
        let arc = Arc::new(value);
        let key = Key::Type(TypeId::of::<T>(), std::any::type_name::<T>());
        let ctor = move |_: &ResolverContext| -> DiResult<AnyArc> { Ok(arc.clone()) };
        self.insert(key, Lifetime::Singleton, Ctor::Sync(Arc::new(ctor)));
        self
    }

    /// Registers a singleton factory that runs on first resolution.
    ///
    /// The factory executes at most once no matter how many concurrent
    /// first resolutions race; the outcome (value or failure) is cached.
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        self.add_factory_impl(Lifetime::Singleton, factory)
    }

    /// Registers a fallible singleton factory.
    ///
    /// A returned error is cached as a construction failure and re-raised
    /// on subsequent resolutions until
    /// [`ServiceProvider::reset_singleton`] is called.
    pub fn try_add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> DiResult<T> + Send + Sync + 'static,
    {
        let key = Key::Type(TypeId::of::<T>(), std::any::type_name::<T>());
        let ctor = move |r: &ResolverContext| -> DiResult<AnyArc> {
            factory(r).map(|v| Arc::new(v) as AnyArc)
        };
        self.insert(key, Lifetime::Singleton, Ctor::Sync(Arc::new(ctor)));
        self
    }

    /// Registers a scoped factory: one instance per request scope.
    pub fn add_scoped_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        self.add_factory_impl(Lifetime::Scoped, factory)
    }

    /// Registers a transient factory: a fresh instance per resolution.
    pub fn add_transient_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        self.add_factory_impl(Lifetime::Transient, factory)
    }

    fn add_factory_impl<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        let key = Key::Type(TypeId::of::<T>(), std::any::type_name::<T>());
        let ctor =
            move |r: &ResolverContext| -> DiResult<AnyArc> { Ok(Arc::new(factory(r)) as AnyArc) };
        self.insert(key, lifetime, Ctor::Sync(Arc::new(ctor)));
        self
    }

    // ----- Async factories -----

    /// Registers a singleton with an async factory.
    ///
    /// For services whose construction must await: database engines,
    /// connection pools, network handshakes. Resolution goes through
    /// `get_async`; concurrent first resolutions park on a per-key async
    /// lock while the factory runs exactly once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_web::{ServiceCollection, AsyncContext};
    ///
    /// struct Pool { size: u32 }
    ///
    /// # async fn example() {
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton_async_factory::<Pool, _, _>(|_cx: AsyncContext| async {
    ///     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    ///     Ok(Pool { size: 8 })
    /// });
    ///
    /// let provider = services.build();
    /// let pool = provider.get_async::<Pool>().await.unwrap();
    /// assert_eq!(pool.size, 8);
    /// # }
    /// ```
    pub fn add_singleton_async_factory<T, F, Fut>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(AsyncContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        self.add_async_factory_impl(Lifetime::Singleton, factory)
    }

    /// Registers a scoped service with an async factory.
    pub fn add_scoped_async_factory<T, F, Fut>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(AsyncContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        self.add_async_factory_impl(Lifetime::Scoped, factory)
    }

    /// Registers a transient service with an async factory.
    pub fn add_transient_async_factory<T, F, Fut>(&mut self, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(AsyncContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        self.add_async_factory_impl(Lifetime::Transient, factory)
    }

    fn add_async_factory_impl<T, F, Fut>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: Fn(AsyncContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        let key = Key::Type(TypeId::of::<T>(), std::any::type_name::<T>());
        let factory = Arc::new(factory);
        let ctor = move |cx: AsyncContext| -> crate::registration::BoxFuture<'static, DiResult<AnyArc>> {
            let fut = factory(cx);
            Box::pin(async move { fut.await.map(|v| Arc::new(v) as AnyArc) })
        };
        self.insert(key, lifetime, Ctor::Async(Arc::new(ctor)));
        self
    }

    // ----- Trait registrations -----

    /// Registers a singleton trait implementation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_web::{ServiceCollection, Resolver};
    /// use std::sync::Arc;
    ///
    /// trait Logger: Send + Sync {
    ///     fn log(&self, message: &str);
    /// }
    ///
    /// struct ConsoleLogger;
    /// impl Logger for ConsoleLogger {
    ///     fn log(&self, message: &str) {
    ///         println!("[LOG] {}", message);
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton_trait::<dyn Logger>(Arc::new(ConsoleLogger));
    ///
    /// let provider = services.build();
    /// provider.get_required_trait::<dyn Logger>().log("ready");
    /// ```
    pub fn add_singleton_trait<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + 'static + Send + Sync,
    {
        let key = Key::Trait(std::any::type_name::<T>());
        // Stored as Arc<Arc<dyn Trait>> inside the Any
        let any_arc: AnyArc = Arc::new(value);
        let ctor = move |_: &ResolverContext| -> DiResult<AnyArc> { Ok(any_arc.clone()) };
        self.insert(key, Lifetime::Singleton, Ctor::Sync(Arc::new(ctor)));
        self
    }

    /// Registers a singleton trait factory.
    pub fn add_singleton_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory_impl(Lifetime::Singleton, factory)
    }

    /// Registers a scoped trait factory: one implementation per request.
    pub fn add_scoped_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory_impl(Lifetime::Scoped, factory)
    }

    /// Registers a transient trait factory.
    pub fn add_transient_trait_factory<Trait, F>(&mut self, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> Arc<Trait> + Send + Sync + 'static,
    {
        self.add_trait_factory_impl(Lifetime::Transient, factory)
    }

    fn add_trait_factory_impl<Trait, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        Trait: ?Sized + 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> Arc<Trait> + Send + Sync + 'static,
    {
        let key = Key::Trait(std::any::type_name::<Trait>());
        let ctor = move |r: &ResolverContext| -> DiResult<AnyArc> {
            // Stored as Arc<Arc<dyn Trait>> inside the Any
            Ok(Arc::new(factory(r)) as AnyArc)
        };
        self.insert(key, lifetime, Ctor::Sync(Arc::new(ctor)));
        self
    }

    // ----- Named registrations -----

    /// Registers a named singleton instance.
    ///
    /// Use when multiple registrations of the same type must coexist, e.g.
    /// a primary and a replica connection string.
    pub fn add_named_singleton<T: 'static + Send + Sync>(
        &mut self,
        name: &'static str,
        value: T,
    ) -> &mut Self {
        let arc = Arc::new(value);
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        let ctor = move |_: &ResolverContext| -> DiResult<AnyArc> { Ok(arc.clone()) };
        self.insert(key, Lifetime::Singleton, Ctor::Sync(Arc::new(ctor)));
        self
    }

    /// Registers a named singleton factory.
    pub fn add_named_singleton_factory<T, F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        let ctor =
            move |r: &ResolverContext| -> DiResult<AnyArc> { Ok(Arc::new(factory(r)) as AnyArc) };
        self.insert(key, Lifetime::Singleton, Ctor::Sync(Arc::new(ctor)));
        self
    }

    /// Registers a named scoped factory.
    pub fn add_named_scoped_factory<T, F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        T: 'static + Send + Sync,
        F: for<'a> Fn(&ResolverContext<'a>) -> T + Send + Sync + 'static,
    {
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        let ctor =
            move |r: &ResolverContext| -> DiResult<AnyArc> { Ok(Arc::new(factory(r)) as AnyArc) };
        self.insert(key, Lifetime::Scoped, Ctor::Sync(Arc::new(ctor)));
        self
    }

    // ----- Observers -----

    /// Adds a resolution observer receiving resolving/resolved/failed
    /// events with per-resolution timing.
    pub fn add_observer(&mut self, observer: Arc<dyn DiObserver>) -> &mut Self {
        self.observers.add(observer);
        self
    }

    fn insert(&mut self, key: Key, lifetime: Lifetime, ctor: Ctor) -> &mut Self {
        self.registry.insert(key, Registration::new(lifetime, ctor));
        self
    }

    /// Finalizes registrations and builds the service provider.
    pub fn build(mut self) -> ServiceProvider {
        self.registry.finalize();
        ServiceProvider::new(self.registry, self.observers)
    }
}

impl Default for ServiceCollection {
    fn default() -> Self {
        Self::new()
    }
}
