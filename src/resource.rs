//! Scheduler-context identity and the per-context resource registry.
//!
//! An external resource (database engine, connection pool) must only ever
//! be used on the cooperative scheduler it was constructed under. The
//! registry keys lazily-built handles by scheduler-context identity
//! through weak references: when a context is torn down, its entry
//! disappears on the next acquire without an explicit unregister, and a
//! replacement context gets a fresh handle instead of the stale one.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Fault;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one cooperative scheduler instance.
///
/// One per worker runtime. Resource handles are bound to the context they
/// were constructed under; two contexts never share a handle.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::SchedulerContext;
///
/// let c1 = SchedulerContext::named("worker-0");
/// let c2 = SchedulerContext::named("worker-1");
/// assert_ne!(c1.id(), c2.id());
/// ```
#[derive(Clone)]
pub struct SchedulerContext {
    inner: Arc<SchedulerContextInner>,
}

struct SchedulerContextInner {
    id: u64,
    name: String,
}

impl SchedulerContext {
    /// Creates a context with a generated name.
    pub fn new() -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self { inner: Arc::new(SchedulerContextInner { id, name: format!("scheduler-{id}") }) }
    }

    /// Creates a context with an explicit name (e.g. the worker name).
    pub fn named(name: impl Into<String>) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self { inner: Arc::new(SchedulerContextInner { id, name: name.into() }) }
    }

    /// Monotonic identity; never reused within a process.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn downgrade(&self) -> Weak<SchedulerContextInner> {
        Arc::downgrade(&self.inner)
    }
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ResourceFactory<R> = Arc<dyn Fn(SchedulerContext) -> BoxFuture<Result<R, Fault>> + Send + Sync>;

struct ResourceEntry<R> {
    id: u64,
    context: Weak<SchedulerContextInner>,
    cell: Arc<tokio::sync::OnceCell<Arc<R>>>,
}

/// Lazily constructs and caches one resource handle per scheduler context.
///
/// Registered in the container as a singleton; the handle type `R` is the
/// external resource (an engine, a pool). Within one context, concurrent
/// first acquires park on a `OnceCell` so the factory runs at most once;
/// a failed construction is *not* cached, so the same context may retry
/// and other contexts are unaffected.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ResourceRegistry, SchedulerContext};
/// use std::sync::Arc;
///
/// struct Engine { dsn: String }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = ResourceRegistry::new(|cx: SchedulerContext| async move {
///     Ok(Engine { dsn: format!("postgres://localhost#{}", cx.id()) })
/// });
///
/// let cx = SchedulerContext::new();
/// let a = registry.acquire(&cx).await.unwrap();
/// let b = registry.acquire(&cx).await.unwrap();
/// assert!(Arc::ptr_eq(&a, &b)); // one handle per context
/// # }
/// ```
pub struct ResourceRegistry<R> {
    factory: ResourceFactory<R>,
    entries: Mutex<Vec<ResourceEntry<R>>>,
}

impl<R: Send + Sync + 'static> ResourceRegistry<R> {
    /// Creates a registry with the given per-context factory.
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn(SchedulerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Fault>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move |cx| Box::pin(factory(cx))),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the handle for `cx`, constructing it on first demand.
    ///
    /// A handle constructed under one context is never returned to a
    /// caller running under a different one; acquiring under a new context
    /// always yields a distinct handle.
    pub async fn acquire(&self, cx: &SchedulerContext) -> Result<Arc<R>, Fault> {
        let cell = {
            let mut entries = self.entries.lock();
            // Dead contexts drop out here; no explicit unregister exists.
            entries.retain(|e| e.context.strong_count() > 0);
            match entries.iter().find(|e| e.id == cx.id()) {
                Some(entry) => entry.cell.clone(),
                None => {
                    let cell = Arc::new(tokio::sync::OnceCell::new());
                    entries.push(ResourceEntry {
                        id: cx.id(),
                        context: cx.downgrade(),
                        cell: cell.clone(),
                    });
                    cell
                }
            }
        };

        let factory = self.factory.clone();
        let cx = cx.clone();
        cell.get_or_try_init(|| async move {
            factory(cx).await.map(Arc::new).map_err(|fault| match fault {
                already @ Fault::Construction { .. } => already,
                other => Fault::construction(
                    std::any::type_name::<R>(),
                    other.to_string(),
                ),
            })
        })
        .await
        .cloned()
    }

    /// Number of live context entries (purges dead ones first).
    pub fn live_contexts(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.context.strong_count() > 0);
        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Handle {
        context_id: u64,
    }

    fn counting_registry(built: Arc<AtomicUsize>) -> ResourceRegistry<Handle> {
        ResourceRegistry::new(move |cx: SchedulerContext| {
            let built = built.clone();
            async move {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(Handle { context_id: cx.id() })
            }
        })
    }

    #[tokio::test]
    async fn one_handle_per_context() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(built.clone());

        let c1 = SchedulerContext::new();
        let c2 = SchedulerContext::new();

        let h1a = registry.acquire(&c1).await.unwrap();
        let h1b = registry.acquire(&c1).await.unwrap();
        let h2 = registry.acquire(&c2).await.unwrap();

        assert!(Arc::ptr_eq(&h1a, &h1b));
        assert!(!Arc::ptr_eq(&h1a, &h2));
        assert_eq!(h1a.context_id, c1.id());
        assert_eq!(h2.context_id, c2.id());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_entries_are_purged_when_the_context_dies() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(built.clone());

        let c1 = SchedulerContext::new();
        let first = registry.acquire(&c1).await.unwrap();
        let first_id = first.context_id;
        drop(first);
        drop(c1);

        let c2 = SchedulerContext::new();
        let second = registry.acquire(&c2).await.unwrap();
        assert_ne!(second.context_id, first_id);
        assert_eq!(registry.live_contexts(), 1);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn construction_failure_does_not_poison_other_contexts() {
        let registry = ResourceRegistry::new(|cx: SchedulerContext| async move {
            if cx.name() == "broken" {
                Err(Fault::server("refused"))
            } else {
                Ok(Handle { context_id: cx.id() })
            }
        });

        let broken = SchedulerContext::named("broken");
        let healthy = SchedulerContext::named("healthy");

        let err = registry.acquire(&broken).await.unwrap_err();
        assert!(matches!(err, Fault::Construction { .. }));
        assert!(registry.acquire(&healthy).await.is_ok());
    }
}
