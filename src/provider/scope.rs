//! Scoped service resolution and lifecycle management.
//!
//! A `Scope` is the container-side face of one in-flight request: scoped
//! services are cached here, and their disposal hooks run when the request
//! ends.

use std::any::TypeId;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::internal::{with_circular_catch, AsyncStack, BoxFutureUnit, DisposeBag};
use crate::key::{key_of_type, Key};
use crate::lifetime::Lifetime;
use crate::registration::{AnyArc, BoxFuture, Ctor};
use crate::traits::{Resolver, ResolverCore};

use super::context::{AsyncContext, AsyncTarget};
use super::{ResolverContext, ServiceProvider};

/// Scoped service container for request-scoped dependency resolution.
///
/// Created by [`ServiceProvider::create_scope`] once per request. Scoped
/// services resolve to the same instance within one scope and to distinct
/// instances across scopes; singletons still come from the root provider.
/// Cloning a `Scope` yields another handle to the *same* scope, which is
/// what lets the executor move it into a request task and still dispose it
/// from the outside on cancellation.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct DatabaseConnection(String);
/// struct UserService { db: Arc<DatabaseConnection> }
///
/// let mut collection = ServiceCollection::new();
/// collection.add_scoped_factory::<DatabaseConnection, _>(|_| {
///     DatabaseConnection("connection-123".to_string())
/// });
/// collection.add_transient_factory::<UserService, _>(|resolver| UserService {
///     db: resolver.get_required::<DatabaseConnection>(),
/// });
///
/// let provider = collection.build();
/// let scope = provider.create_scope();
///
/// // Services resolved in the same scope share the connection.
/// let a = scope.get_required::<UserService>();
/// let b = scope.get_required::<UserService>();
/// assert!(Arc::ptr_eq(&a.db, &b.db));
/// ```
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    root: ServiceProvider,
    /// Slot-based scoped storage for O(1) access
    cells: Box<[OnceCell<AnyArc>]>,
    disposers: Mutex<DisposeBag>,
    /// Per-slot construction locks for async scoped factories; per slot so
    /// a factory constructing a different scoped dependency does not
    /// deadlock on its own scope
    slot_locks: Box<[tokio::sync::Mutex<()>]>,
}

impl Scope {
    pub(crate) fn new(root: ServiceProvider) -> Self {
        let scoped_count = root.inner().registry.scoped_count;
        let cells: Box<[OnceCell<AnyArc>]> =
            (0..scoped_count).map(|_| OnceCell::new()).collect::<Vec<_>>().into_boxed_slice();
        let slot_locks: Box<[tokio::sync::Mutex<()>]> = (0..scoped_count)
            .map(|_| tokio::sync::Mutex::new(()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            inner: Arc::new(ScopeInner {
                root,
                cells,
                disposers: Mutex::new(DisposeBag::default()),
                slot_locks,
            }),
        }
    }

    /// The root provider this scope was created from.
    pub fn root(&self) -> &ServiceProvider {
        &self.inner.root
    }

    /// Resolves a service through the async path, awaiting its factory if
    /// construction has not happened yet.
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

    /// Sync scoped resolution using the slot cell.
    fn resolve_scoped_sync(&self, key: &Key, slot: usize, ctor: &Ctor) -> DiResult<AnyArc> {
        let cell = &self.inner.cells[slot];
        if let Some(value) = cell.get() {
            return Ok(value.clone());
        }
        match ctor {
            Ctor::Sync(f) => {
                let ctx = ResolverContext::new(self);
                let v = (f)(&ctx)?;
                Ok(cell.get_or_init(|| v.clone()).clone())
            }
            Ctor::Async(_) => Err(DiError::AsyncOnly(key.display_name())),
        }
    }

    fn resolve_any_impl(&self, key: &Key) -> DiResult<AnyArc> {
        if let Some(v) = self.inner.root.lookup_override(key) {
            return Ok(v);
        }
        let name = key.display_name();
        let reg = self.inner.root.inner().registry.get(key).ok_or(DiError::NotFound(name))?;
        match reg.lifetime {
            Lifetime::Singleton => self.inner.root.resolve_singleton_sync(key, reg),
            Lifetime::Scoped => {
                let slot = reg.scoped_slot.expect("scoped registration without a slot");
                self.resolve_scoped_sync(key, slot, &reg.ctor)
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

    /// Async resolution entry; singletons delegate to the root, scoped
    /// services initialize under the per-scope construction lock.
    pub(crate) fn resolve_any_async(
        &self,
        key: Key,
        stack: AsyncStack,
    ) -> BoxFuture<'static, DiResult<AnyArc>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some(v) = this.inner.root.lookup_override(&key) {
                return Ok(v);
            }
            let name = key.display_name();
            let reg = this
                .inner
                .root
                .inner()
                .registry
                .get(&key)
                .ok_or(DiError::NotFound(name))?;
            match reg.lifetime {
                Lifetime::Singleton => {
                    this.inner.root.resolve_any_async(key.clone(), stack).await
                }
                Lifetime::Scoped => {
                    let slot = reg.scoped_slot.expect("scoped registration without a slot");
                    let cell = &this.inner.cells[slot];
                    if let Some(value) = cell.get() {
                        return Ok(value.clone());
                    }
                    match &reg.ctor {
                        Ctor::Sync(_) => {
                            with_circular_catch(name, || {
                                this.resolve_scoped_sync(&key, slot, &reg.ctor)
                            })
                        }
                        Ctor::Async(ctor) => {
                            // Cycle check before parking on the slot lock,
                            // which this task may already hold.
                            let child = stack.push(name)?;
                            let _guard = this.inner.slot_locks[slot].lock().await;
                            if let Some(value) = cell.get() {
                                return Ok(value.clone());
                            }
                            let cx =
                                AsyncContext::new(AsyncTarget::Scoped(this.clone()), child);
                            let v = (ctor)(cx).await?;
                            Ok(cell.get_or_init(|| v.clone()).clone())
                        }
                    }
                }
                Lifetime::Transient => match &reg.ctor {
                    Ctor::Sync(ctor) => with_circular_catch(name, || {
                        let ctx = ResolverContext::new(&this);
                        (ctor)(&ctx)
                    }),
                    Ctor::Async(ctor) => {
                        let child = stack.push(name)?;
                        let cx = AsyncContext::new(AsyncTarget::Scoped(this.clone()), child);
                        (ctor)(cx).await
                    }
                },
            }
        })
    }

    /// Disposes all scoped disposal hooks in LIFO order.
    ///
    /// Async hooks run first (reverse order), then sync hooks (reverse
    /// order). The executor calls this at end-of-request on success,
    /// fault, and cancellation alike; calling it twice is a no-op because
    /// the bag drains on the first call.
    pub async fn dispose_all(&self) {
        let mut bag = std::mem::take(&mut *self.inner.disposers.lock());
        bag.run_all_async_reverse().await;
        bag.run_all_sync_reverse();
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let bag = self.disposers.get_mut();
        if !bag.is_empty() {
            tracing::warn!(
                "Scope dropped with undisposed resources; call dispose_all().await first"
            );
        }
    }
}

impl ResolverCore for Scope {
    fn resolve_any(&self, key: &Key) -> DiResult<AnyArc> {
        let name = key.display_name();
        with_circular_catch(name, || self.resolve_any_impl(key))
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() + Send>) {
        self.inner.disposers.lock().push_sync(f);
    }

    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFutureUnit + Send>) {
        self.inner.disposers.lock().push_async(move || (f)());
    }
}

impl Resolver for Scope {}
