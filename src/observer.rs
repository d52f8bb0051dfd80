//! Diagnostic observers for dependency resolution traceability.
//!
//! Observers hook resolving/resolved/failed events on the container,
//! enabling structured tracing and performance monitoring without touching
//! the resolution hot path when no observer is registered.

use std::sync::Arc;
use std::time::Duration;

use crate::error::DiError;
use crate::key::Key;

/// Observer trait for dependency resolution events.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{DiObserver, Key, ServiceCollection, Resolver};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct CountingObserver {
///     resolutions: Mutex<usize>,
/// }
///
/// impl DiObserver for CountingObserver {
///     fn resolving(&self, _key: &Key) {}
///     fn resolved(&self, _key: &Key, _duration: Duration) {
///         *self.resolutions.lock().unwrap() += 1;
///     }
///     fn failed(&self, _key: &Key, _error: &ferrous_web::DiError) {}
/// }
///
/// let observer = Arc::new(CountingObserver::default());
/// let mut services = ServiceCollection::new();
/// services.add_singleton(1u8);
/// services.add_observer(observer.clone());
///
/// let provider = services.build();
/// let _ = provider.get_required::<u8>();
/// assert_eq!(*observer.resolutions.lock().unwrap(), 1);
/// ```
pub trait DiObserver: Send + Sync {
    /// A resolution is starting for `key`.
    fn resolving(&self, key: &Key);
    /// A resolution completed successfully after `duration`.
    fn resolved(&self, key: &Key, duration: Duration);
    /// A resolution failed.
    fn failed(&self, key: &Key, error: &DiError);
}

/// Observer that forwards resolution events to `tracing`.
pub struct LoggingObserver;

impl DiObserver for LoggingObserver {
    fn resolving(&self, key: &Key) {
        tracing::trace!(service = key.display_name(), "resolving");
    }

    fn resolved(&self, key: &Key, duration: Duration) {
        tracing::trace!(
            service = key.display_name(),
            duration_us = duration.as_micros() as u64,
            "resolved"
        );
    }

    fn failed(&self, key: &Key, error: &DiError) {
        tracing::debug!(service = key.display_name(), %error, "resolution failed");
    }
}

/// Registered observer set, shared by the provider and its scopes.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    list: Arc<Vec<Arc<dyn DiObserver>>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn DiObserver>) {
        Arc::make_mut(&mut self.list).push(observer);
    }

    #[inline(always)]
    pub(crate) fn has_observers(&self) -> bool {
        !self.list.is_empty()
    }

    pub(crate) fn resolving(&self, key: &Key) {
        for o in self.list.iter() {
            o.resolving(key);
        }
    }

    pub(crate) fn resolved(&self, key: &Key, duration: Duration) {
        for o in self.list.iter() {
            o.resolved(key, duration);
        }
    }

    pub(crate) fn failed(&self, key: &Key, error: &DiError) {
        for o in self.list.iter() {
            o.failed(key, error);
        }
    }
}
