//! Service provider module for dependency injection.
//!
//! Contains the `ServiceProvider` type and related functionality for
//! resolving registered services, including the async singleton
//! construction path and the test-harness override hook.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{DiError, DiResult};
use crate::internal::{with_circular_catch, AsyncStack, BoxFutureUnit, DisposeBag};
use crate::key::{key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::observer::Observers;
use crate::registration::{AnyArc, BoxFuture, Ctor, Registration, Registry};
use crate::traits::{Resolver, ResolverCore};

pub mod context;
pub mod scope;
pub use context::{AsyncContext, ResolverContext};
pub use scope::Scope;

use context::AsyncTarget;

/// Service provider for resolving dependencies from the DI container.
///
/// The provider resolves services according to their registered lifetimes
/// (Singleton, Scoped, Transient) and owns the singleton lifecycle
/// including disposal. It is cheap to clone (`Arc` internally) and fully
/// thread-safe: singleton construction is guarded per key, so N concurrent
/// first resolutions of the same key run the constructor exactly once and
/// all N callers receive the same instance.
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
/// let mut collection = ServiceCollection::new();
/// collection.add_singleton(Database { url: "postgres://localhost".to_string() });
/// collection.add_transient_factory::<UserService, _>(|resolver| UserService {
///     db: resolver.get_required::<Database>(),
/// });
///
/// let provider = collection.build();
/// let user_service = provider.get_required::<UserService>();
/// assert_eq!(user_service.db.url, "postgres://localhost");
/// ```
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

pub(crate) struct ProviderInner {
    pub registry: Registry,
    /// Test-harness stand-ins, checked before the registry on every
    /// resolution. Entries live as long as their `OverrideGuard`.
    pub overrides: RwLock<HashMap<Key, AnyArc>>,
    pub root_disposers: Mutex<DisposeBag>,
    pub observers: Observers,
}

impl ServiceProvider {
    #[inline]
    pub(crate) fn inner(&self) -> &ProviderInner {
        &self.inner
    }

    pub(crate) fn new(registry: Registry, observers: Observers) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                registry,
                overrides: RwLock::new(HashMap::new()),
                root_disposers: Mutex::new(DisposeBag::default()),
                observers,
            }),
        }
    }

    /// Creates a new scope for resolving scoped services.
    ///
    /// A scope corresponds to one in-flight request: scoped services are
    /// cached per scope, constructed fresh for each request, and their
    /// disposal hooks run when the scope is disposed at end-of-request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_web::{ServiceCollection, Resolver};
    /// use std::sync::{Arc, Mutex};
    ///
    /// struct RequestId(String);
    ///
    /// let mut collection = ServiceCollection::new();
    /// let counter = Arc::new(Mutex::new(0));
    /// let counter_clone = counter.clone();
    /// collection.add_scoped_factory::<RequestId, _>(move |_| {
    ///     let mut c = counter_clone.lock().unwrap();
    ///     *c += 1;
    ///     RequestId(format!("req-{}", *c))
    /// });
    ///
    /// let provider = collection.build();
    /// let scope1 = provider.create_scope();
    /// let scope2 = provider.create_scope();
    ///
    /// let a = scope1.get_required::<RequestId>();
    /// let b = scope1.get_required::<RequestId>();
    /// let c = scope2.get_required::<RequestId>();
    /// assert!(Arc::ptr_eq(&a, &b));
    /// assert!(!Arc::ptr_eq(&a, &c));
    /// ```
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone())
    }

    /// Resolves a service through the async path, awaiting its factory if
    /// construction has not happened yet.
    ///
    /// Works for both sync- and async-registered services; it is the only
    /// way to resolve services registered with an async factory.
    pub async fn get_async<T: 'static + Send + Sync>(&self) -> DiResult<Arc<T>> {
        let any = self.resolve_any_async(key_of_type::<T>(), AsyncStack::new()).await?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Resolves a named service through the async path.
    pub async fn get_named_async<T: 'static + Send + Sync>(
        &self,
        name: &'static str,
    ) -> DiResult<Arc<T>> {
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        let any = self.resolve_any_async(key, AsyncStack::new()).await?;
        any.downcast::<T>()
            .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
    }

    /// Clears a cached singleton outcome (value or failure) so the next
    /// resolution runs the factory again.
    ///
    /// This is the explicit reset of the failure-caching policy: a failed
    /// singleton re-raises its construction fault on every resolution
    /// until this is called or the process restarts.
    pub fn reset_singleton<T: 'static>(&self) -> bool {
        self.reset_key(&key_of_type::<T>())
    }

    pub(crate) fn reset_key(&self, key: &Key) -> bool {
        if let Some(reg) = self.inner.registry.get(key) {
            if let Some(cell) = &reg.single {
                cell.reset();
                return true;
            }
        }
        false
    }

    /// Substitutes a concrete service with a stand-in for testing.
    ///
    /// While the returned guard lives, every resolution of `T` (from the
    /// root or any scope) yields the stand-in; dropping the guard reverts
    /// to the real registration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_web::{ServiceCollection, Resolver};
    ///
    /// struct Mailer { endpoint: String }
    ///
    /// let mut collection = ServiceCollection::new();
    /// collection.add_singleton(Mailer { endpoint: "smtp://real".to_string() });
    /// let provider = collection.build();
    ///
    /// {
    ///     let _guard = provider.override_instance(Mailer {
    ///         endpoint: "smtp://stub".to_string(),
    ///     });
    ///     assert_eq!(provider.get_required::<Mailer>().endpoint, "smtp://stub");
    /// }
    /// assert_eq!(provider.get_required::<Mailer>().endpoint, "smtp://real");
    /// ```
    pub fn override_instance<T: 'static + Send + Sync>(&self, value: T) -> OverrideGuard {
        self.install_override(key_of_type::<T>(), Arc::new(value))
    }

    /// Substitutes a named concrete service with a stand-in.
    pub fn override_named<T: 'static + Send + Sync>(
        &self,
        name: &'static str,
        value: T,
    ) -> OverrideGuard {
        let key = Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name);
        self.install_override(key, Arc::new(value))
    }

    /// Substitutes a trait implementation with a stand-in.
    pub fn override_trait<T: ?Sized + 'static + Send + Sync>(
        &self,
        value: Arc<T>,
    ) -> OverrideGuard
    where
        Arc<T>: Send + Sync,
    {
        let key = Key::Trait(std::any::type_name::<T>());
        self.install_override(key, Arc::new(value))
    }

    fn install_override(&self, key: Key, value: AnyArc) -> OverrideGuard {
        self.inner.overrides.write().insert(key.clone(), value);
        OverrideGuard { provider: self.clone(), key }
    }

    pub(crate) fn lookup_override(&self, key: &Key) -> Option<AnyArc> {
        let overrides = self.inner.overrides.read();
        overrides.get(key).cloned()
    }

    /// Disposes all registered root disposal hooks in LIFO order.
    ///
    /// Async hooks run first (reverse order), then sync hooks (reverse
    /// order). Call once at worker shutdown.
    pub async fn dispose_all(&self) {
        let mut bag = std::mem::take(&mut *self.inner.root_disposers.lock());
        bag.run_all_async_reverse().await;
        bag.run_all_sync_reverse();
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Service Provider Debug ===\n");
        for (k, r) in self.inner.registry.iter() {
            s.push_str(&format!("  {:?}: {:?}\n", k, r.lifetime));
        }
        s
    }

    /// Singleton resolution shared by the root and scope sync paths.
    pub(crate) fn resolve_singleton_sync(
        &self,
        key: &Key,
        reg: &Registration,
    ) -> DiResult<AnyArc> {
        let cell = reg
            .single
            .as_ref()
            .expect("singleton registration without a cell");
        match &reg.ctor {
            Ctor::Sync(ctor) => {
                let ctor = ctor.clone();
                cell.get_or_init_sync(key.display_name(), || {
                    let ctx = ResolverContext::new(self);
                    (ctor)(&ctx)
                })
            }
            Ctor::Async(_) => {
                // Already constructed through the async path is fine; an
                // unconstructed async singleton cannot be built here.
                cell.peek()
                    .unwrap_or_else(|| Err(DiError::AsyncOnly(key.display_name())))
            }
        }
    }

    fn resolve_any_impl(&self, key: &Key) -> DiResult<AnyArc> {
        if let Some(v) = self.lookup_override(key) {
            return Ok(v);
        }
        let name = key.display_name();
        let reg = self.inner.registry.get(key).ok_or(DiError::NotFound(name))?;
        match reg.lifetime {
            Lifetime::Singleton => self.resolve_singleton_sync(key, reg),
            Lifetime::Scoped => {
                Err(DiError::WrongLifetime("Cannot resolve scoped service from root provider"))
            }
            Lifetime::Transient => match &reg.ctor {
                Ctor::Sync(ctor) => {
                    let ctx = ResolverContext::new(self);
                    (ctor)(&ctx)
                }
                Ctor::Async(_) => Err(DiError::AsyncOnly(name)),
            },
        }
    }

    /// Async resolution entry shared by `get_async`, scopes, and async
    /// factories. The `stack` carries the in-progress chain for circular
    /// detection across await points.
    pub(crate) fn resolve_any_async(
        &self,
        key: Key,
        stack: AsyncStack,
    ) -> BoxFuture<'static, DiResult<AnyArc>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some(v) = this.lookup_override(&key) {
                return Ok(v);
            }
            let name = key.display_name();
            if this.inner.observers.has_observers() {
                let observers = this.inner.observers.clone();
                observers.resolving(&key);
                let start = std::time::Instant::now();
                let result = this.resolve_async_inner(&key, name, stack).await;
                match &result {
                    Ok(_) => observers.resolved(&key, start.elapsed()),
                    Err(e) => observers.failed(&key, e),
                }
                result
            } else {
                this.resolve_async_inner(&key, name, stack).await
            }
        })
    }

    async fn resolve_async_inner(
        &self,
        key: &Key,
        name: &'static str,
        stack: AsyncStack,
    ) -> DiResult<AnyArc> {
        let reg = self.inner.registry.get(key).ok_or(DiError::NotFound(name))?;
        match reg.lifetime {
            Lifetime::Singleton => {
                let cell = reg
                    .single
                    .as_ref()
                    .expect("singleton registration without a cell");
                match &reg.ctor {
                    Ctor::Sync(_) => {
                        with_circular_catch(name, || self.resolve_singleton_sync(key, reg))
                    }
                    Ctor::Async(ctor) => {
                        if let Some(outcome) = cell.peek() {
                            return outcome;
                        }
                        // Cycle check before parking on the construction
                        // lock: a task re-entering its own in-progress key
                        // must error out, not await itself.
                        let child = stack.push(name)?;
                        let ctor = ctor.clone();
                        let this = self.clone();
                        cell.get_or_init_async(name, move || {
                            let cx = AsyncContext::new(AsyncTarget::Root(this), child);
                            (ctor)(cx)
                        })
                        .await
                    }
                }
            }
            Lifetime::Scoped => {
                Err(DiError::WrongLifetime("Cannot resolve scoped service from root provider"))
            }
            Lifetime::Transient => match &reg.ctor {
                Ctor::Sync(ctor) => with_circular_catch(name, || {
                    let ctx = ResolverContext::new(self);
                    (ctor)(&ctx)
                }),
                Ctor::Async(ctor) => {
                    let child = stack.push(name)?;
                    let cx = AsyncContext::new(AsyncTarget::Root(self.clone()), child);
                    (ctor)(cx).await
                }
            },
        }
    }
}

impl Clone for ServiceProvider {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl Drop for ServiceProvider {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            if let Some(bag) = self.inner.root_disposers.try_lock() {
                if !bag.is_empty() {
                    tracing::warn!(
                        "ServiceProvider dropped with undisposed resources; call dispose_all().await first"
                    );
                }
            }
        }
    }
}

impl ResolverCore for ServiceProvider {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        let name = key.display_name();
        if self.inner.observers.has_observers() {
            self.inner.observers.resolving(key);
            let start = std::time::Instant::now();
            let result = with_circular_catch(name, || self.resolve_any_impl(key));
            match &result {
                Ok(_) => self.inner.observers.resolved(key, start.elapsed()),
                Err(e) => self.inner.observers.failed(key, e),
            }
            result
        } else {
            with_circular_catch(name, || self.resolve_any_impl(key))
        }
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.inner.root_disposers.lock().push_sync(f);
    }

    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>) {
        self.inner.root_disposers.lock().push_async(move || (f)());
    }
}

impl Resolver for ServiceProvider {}

/// Reverts a service override when dropped.
///
/// Returned by the `override_*` methods on [`ServiceProvider`]; the
/// stand-in stays active for the guard's lifetime (typically one test run).
pub struct OverrideGuard {
    provider: ServiceProvider,
    key: Key,
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        self.provider.inner.overrides.write().remove(&self.key);
    }
}
