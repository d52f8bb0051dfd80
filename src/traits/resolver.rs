//! Resolver traits for service resolution.

use std::any::TypeId;
use std::sync::Arc;

use crate::error::DiResult;
use crate::internal::BoxFutureUnit;
use crate::key::Key;
use crate::traits::{AsyncDispose, Dispose};

/// Core resolver trait for object-safe service resolution.
///
/// Handles the low-level resolution mechanics including circular dependency
/// detection. Most users should use the [`Resolver`] trait instead, which
/// provides ergonomic generic methods on top of this one.
///
/// The sync core only reaches services registered with sync factories;
/// resolving a key whose registration carries an async factory yields
/// [`DiError::AsyncOnly`](crate::DiError::AsyncOnly); use the `get_async`
/// methods on `ServiceProvider`/`Scope` for those.
pub trait ResolverCore: Send + Sync {
    /// Resolves a single service, tracking the in-progress chain for
    /// circular dependency detection.
    fn resolve_any(&self, key: &Key) -> DiResult<Arc<dyn std::any::Any + Send + Sync>>;

    /// Registers a synchronous disposal hook with the owning lifetime
    /// (scope or root).
    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>);

    /// Registers an asynchronous disposal hook with the owning lifetime.
    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>);
}

/// High-level resolver interface with generic, type-safe methods.
///
/// Both `ServiceProvider` and `Scope` implement this trait, making them
/// interchangeable for service resolution within their respective
/// lifetimes.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {
///     fn now_ms(&self) -> u64;
/// }
///
/// struct FixedClock;
/// impl Clock for FixedClock {
///     fn now_ms(&self) -> u64 { 1_700_000_000_000 }
/// }
///
/// let mut collection = ServiceCollection::new();
/// collection.add_singleton(42usize);
/// collection.add_singleton_trait(Arc::new(FixedClock) as Arc<dyn Clock>);
///
/// let provider = collection.build();
/// assert_eq!(*provider.get_required::<usize>(), 42);
/// let clock = provider.get_required_trait::<dyn Clock>();
/// assert_eq!(clock.now_ms(), 1_700_000_000_000);
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a concrete service type.
    fn get<T: 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        let key = Key::Type(TypeId::of::<T>(), std::any::type_name::<T>());
        let any = self.resolve_any(&key)?;
        any.downcast::<T>()
            .map_err(|_| crate::error::DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a trait implementation.
    ///
    /// Trait objects are stored as `Arc<Arc<dyn Trait>>` internally, so the
    /// downcast goes through the inner `Arc`.
    fn get_trait<T: ?Sized + 'static + Send + Sync>(&self) -> DiResult<Arc<T>>
    where
        Arc<T>: 'static,
    {
        let key = Key::Trait(std::any::type_name::<T>());
        let any = self.resolve_any(&key)?;
        any.downcast::<Arc<T>>()
            .map(|boxed| (*boxed).clone())
            .map_err(|_| crate::error::DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a concrete service type, panicking on failure.
    ///
    /// Use when the service is known to be registered and a missing
    /// registration is a programming error worth failing fast on.
    fn get_required<T: 'static + Send + Sync>(&self) -> Arc<T> {
        self.get::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {:?}", std::any::type_name::<T>(), e))
    }

    /// Resolves a trait implementation, panicking on failure.
    fn get_required_trait<T: ?Sized + 'static + Send + Sync>(&self) -> Arc<T>
    where
        Arc<T>: 'static,
    {
        self.get_trait::<T>()
            .unwrap_or_else(|e| {
                panic!("Failed to resolve trait {}: {:?}", std::any::type_name::<T>(), e)
            })
    }

    /// Resolves a named concrete service type.
    fn get_named<T: 'static + Send + Sync>(&self, name: &'static str) -> DiResult<Arc<T>> {
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        let any = self.resolve_any(&key)?;
        any.downcast::<T>()
            .map_err(|_| crate::error::DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a named concrete service type, panicking on failure.
    fn get_named_required<T: 'static + Send + Sync>(&self, name: &'static str) -> Arc<T> {
        self.get_named::<T>(name).unwrap_or_else(|e| {
            panic!(
                "Failed to resolve named {} ({}): {:?}",
                std::any::type_name::<T>(),
                name,
                e
            )
        })
    }

    /// Resolves a named trait implementation.
    fn get_named_trait<T: ?Sized + 'static + Send + Sync>(
        &self,
        name: &'static str,
    ) -> DiResult<Arc<T>>
    where
        Arc<T>: 'static,
    {
        let key = Key::TraitNamed(std::any::type_name::<T>(), name);
        let any = self.resolve_any(&key)?;
        any.downcast::<Arc<T>>()
            .map(|boxed| (*boxed).clone())
            .map_err(|_| crate::error::DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Registers a service for synchronous disposal.
    ///
    /// Call from a factory so the instance is cleaned up when its owning
    /// lifetime ends. Hooks execute in LIFO order.
    fn register_disposer<T: Dispose + 'static>(&self, service: Arc<T>) {
        self.push_sync_disposer(Box::new(move || service.dispose()));
    }

    /// Registers a service for asynchronous disposal.
    ///
    /// Async disposal hooks run before sync hooks, in LIFO order.
    fn register_async_disposer<T: AsyncDispose + 'static>(&self, service: Arc<T>) {
        self.push_async_disposer(Box::new(move || {
            Box::pin(async move {
                service.dispose().await;
            })
        }));
    }
}
