//! Disposal traits for deterministic cleanup.

use async_trait::async_trait;

/// Synchronous disposal hook.
///
/// Services that hold resources needing deterministic cleanup implement
/// this and register themselves with
/// [`Resolver::register_disposer`](crate::Resolver::register_disposer)
/// inside their factory. Scoped disposers run at end-of-request, singleton
/// disposers at provider shutdown, both in LIFO order.
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

/// Asynchronous disposal hook.
///
/// Like [`Dispose`] but for services whose cleanup must await (connection
/// draining, flush-on-close). Async disposers run before sync disposers.
#[async_trait]
pub trait AsyncDispose: Send + Sync {
    async fn dispose(&self);
}
