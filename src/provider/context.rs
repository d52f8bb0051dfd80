//! Resolver contexts passed to factory functions.
//!
//! Sync factories receive a borrowed [`ResolverContext`]; async factories
//! receive an owned [`AsyncContext`] they can move into their future.

use std::sync::Arc;

use crate::error::DiResult;
use crate::internal::AsyncStack;
use crate::key::{key_of_type, Key};
use crate::registration::AnyArc;
use crate::traits::{AsyncDispose, Dispose, Resolver, ResolverCore};

use super::{Scope, ServiceProvider};

/// Context passed to sync factory functions for resolving dependencies.
///
/// Wraps a resolver (`ServiceProvider` or `Scope`) so factory functions are
/// independent of the specific resolver type.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Database { url: "postgres://localhost".to_string() });
/// services.add_transient_factory::<UserService, _>(|resolver| UserService {
///     db: resolver.get_required::<Database>(),
/// });
/// ```
pub struct ResolverContext<'a> {
    resolver: &'a dyn ResolverCore,
}

impl<'a> ResolverContext<'a> {
    pub(crate) fn new<T>(resolver: &'a T) -> Self
    where
        T: ResolverCore,
    {
        Self { resolver }
    }
}

impl<'a> ResolverCore for ResolverContext<'a> {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        self.resolver.resolve_any(key)
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.resolver.push_sync_disposer(f);
    }

    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> crate::internal::BoxFutureUnit + Send>) {
        self.resolver.push_async_disposer(f);
    }
}

impl<'a> Resolver for ResolverContext<'a> {}

/// Where an async factory resolves its own dependencies from.
#[derive(Clone)]
pub(crate) enum AsyncTarget {
    Root(ServiceProvider),
    Scoped(Scope),
}

/// Owned context passed to async factory functions.
///
/// Carries the originating resolver plus the explicit resolution stack used
/// for circular dependency detection across await points.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, AsyncContext, DiResult};
/// use std::sync::Arc;
///
/// struct Settings { dsn: String }
/// struct Pool { dsn: String }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Settings { dsn: "postgres://localhost".to_string() });
/// services.add_singleton_async_factory::<Pool, _, _>(|cx: AsyncContext| async move {
///     let settings = cx.get::<Settings>()?;
///     // ... async pool handshake would happen here ...
///     Ok(Pool { dsn: settings.dsn.clone() })
/// });
/// ```
pub struct AsyncContext {
    pub(crate) target: AsyncTarget,
    pub(crate) stack: AsyncStack,
}

impl AsyncContext {
    pub(crate) fn new(target: AsyncTarget, stack: AsyncStack) -> Self {
        Self { target, stack }
    }

    /// Resolves a sync-constructed service.
    pub fn get<T: 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        match &self.target {
            AsyncTarget::Root(p) => p.get::<T>(),
            AsyncTarget::Scoped(s) => s.get::<T>(),
        }
    }

    /// Resolves a sync-constructed trait implementation.
    pub fn get_trait<T: ?Sized + 'static + Send + Sync>(&self) -> DiResult<Arc<T>>
    where
        Arc<T>: 'static,
    {
        match &self.target {
            AsyncTarget::Root(p) => p.get_trait::<T>(),
            AsyncTarget::Scoped(s) => s.get_trait::<T>(),
        }
    }

    /// Resolves a service through the async path, awaiting construction if
    /// it has not happened yet.
    pub async fn get_async<T: 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        let key = key_of_type::<T>();
        let any = match &self.target {
            AsyncTarget::Root(p) => p.resolve_any_async(key, self.stack.clone()).await?,
            AsyncTarget::Scoped(s) => s.resolve_any_async(key, self.stack.clone()).await?,
        };
        any.downcast::<T>()
            .map_err(|_| crate::error::DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Registers a service for synchronous disposal with the originating
    /// lifetime (scope or root).
    pub fn register_disposer<T: Dispose + 'static>(&self, service: Arc<T>) {
        let f: Box<dyn FnOnce() + Send> = Box::new(move || service.dispose());
        match &self.target {
            AsyncTarget::Root(p) => p.push_sync_disposer(f),
            AsyncTarget::Scoped(s) => s.push_sync_disposer(f),
        }
    }

    /// Registers a service for asynchronous disposal with the originating
    /// lifetime.
    pub fn register_async_disposer<T: AsyncDispose + 'static>(&self, service: Arc<T>) {
        let f: Box<dyn FnOnce() -> crate::internal::BoxFutureUnit + Send> =
            Box::new(move || {
                Box::pin(async move {
                    service.dispose().await;
                })
            });
        match &self.target {
            AsyncTarget::Root(p) => p.push_async_disposer(f),
            AsyncTarget::Scoped(s) => s.push_async_disposer(f),
        }
    }
}
