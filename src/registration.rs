//! Service registration types and singleton storage.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::lifetime::Lifetime;
use crate::provider::{AsyncContext, ResolverContext};

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Factory behind a registration. Sync factories run inline on the
/// resolving thread; async factories receive an owned context so they can
/// await (database handshakes, pool warm-up) and are only reachable through
/// the `get_async` resolution path.
pub(crate) enum Ctor {
    Sync(Arc<dyn for<'a> Fn(&ResolverContext<'a>) -> DiResult<AnyArc> + Send + Sync>),
    Async(Arc<dyn Fn(AsyncContext) -> BoxFuture<'static, DiResult<AnyArc>> + Send + Sync>),
}

impl Ctor {
    pub(crate) fn is_async(&self) -> bool {
        matches!(self, Ctor::Async(_))
    }
}

/// State of a singleton slot.
///
/// `Failed` is a deliberate policy: a construction fault is cached and
/// re-raised on every subsequent resolution until an explicit reset, so a
/// broken singleton does not retry on every request.
pub(crate) enum SlotState {
    Empty,
    Ready(AnyArc),
    Failed(DiError),
}

/// Per-registration singleton storage.
///
/// The fast path reads `state` without touching either construction lock.
/// First construction is serialized per key: sync factories through
/// `sync_init` (they never await while holding it), async factories
/// through the `tokio` mutex so concurrent first requests park instead of
/// racing the constructor.
pub(crate) struct SingletonCell {
    state: RwLock<SlotState>,
    sync_init: Mutex<()>,
    async_init: tokio::sync::Mutex<()>,
}

impl SingletonCell {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(SlotState::Empty),
            sync_init: Mutex::new(()),
            async_init: tokio::sync::Mutex::new(()),
        }
    }

    /// Done-flag check: returns the cached outcome without locking the
    /// construction path.
    pub(crate) fn peek(&self) -> Option<DiResult<AnyArc>> {
        match &*self.state.read() {
            SlotState::Empty => None,
            SlotState::Ready(v) => Some(Ok(v.clone())),
            SlotState::Failed(e) => Some(Err(e.clone())),
        }
    }

    /// Resolve through a sync factory with at-most-one construction.
    pub(crate) fn get_or_init_sync<F>(&self, name: &'static str, f: F) -> DiResult<AnyArc>
    where
        F: FnOnce() -> DiResult<AnyArc>,
    {
        if let Some(outcome) = self.peek() {
            return outcome;
        }
        let _guard = self.sync_init.lock();
        // Double check: another thread may have finished while we waited.
        if let Some(outcome) = self.peek() {
            return outcome;
        }
        let outcome = f().map_err(|e| as_construction_failure(name, e));
        self.store(&outcome);
        outcome
    }

    /// Resolve through an async factory with at-most-one construction.
    ///
    /// Concurrent first resolutions all await the same construction; the
    /// factory future runs exactly once.
    pub(crate) async fn get_or_init_async<F, Fut>(
        &self,
        name: &'static str,
        f: F,
    ) -> DiResult<AnyArc>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiResult<AnyArc>>,
    {
        if let Some(outcome) = self.peek() {
            return outcome;
        }
        let _guard = self.async_init.lock().await;
        if let Some(outcome) = self.peek() {
            return outcome;
        }
        let outcome = f().await.map_err(|e| as_construction_failure(name, e));
        self.store(&outcome);
        outcome
    }

    fn store(&self, outcome: &DiResult<AnyArc>) {
        let mut state = self.state.write();
        *state = match outcome {
            Ok(v) => SlotState::Ready(v.clone()),
            Err(e) => SlotState::Failed(e.clone()),
        };
    }

    /// Clears a cached outcome so the next resolution reconstructs.
    pub(crate) fn reset(&self) {
        *self.state.write() = SlotState::Empty;
    }
}

fn as_construction_failure(name: &'static str, e: DiError) -> DiError {
    match e {
        already @ DiError::Construction { .. } => already,
        other => DiError::Construction { service: name, message: other.to_string() },
    }
}

/// Service registration with lifetime and constructor.
pub(crate) struct Registration {
    pub(crate) lifetime: Lifetime,
    pub(crate) ctor: Ctor,
    /// Singleton slot, present only for `Lifetime::Singleton`
    pub(crate) single: Option<SingletonCell>,
    /// Scoped slot index for O(1) scoped resolution, assigned in finalize
    pub(crate) scoped_slot: Option<usize>,
}

impl Registration {
    pub(crate) fn new(lifetime: Lifetime, ctor: Ctor) -> Self {
        let single = match lifetime {
            Lifetime::Singleton => Some(SingletonCell::new()),
            _ => None,
        };
        Self { lifetime, ctor, single, scoped_slot: None }
    }
}

/// Service registry holding all registrations.
pub(crate) struct Registry {
    /// Fast Vec lookup for the first N registrations (cache-friendly)
    pub(crate) small: Vec<(Key, Registration)>,
    /// HashMap fallback for larger collections
    pub(crate) large: HashMap<Key, Registration>,
    /// Total count of scoped registrations for slot allocation
    pub(crate) scoped_count: usize,
    /// Threshold for Vec vs HashMap storage
    small_threshold: usize,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            small: Vec::new(),
            large: HashMap::new(),
            scoped_count: 0,
            small_threshold: 16,
        }
    }

    /// Inserts a registration; the last registration for a key wins.
    pub(crate) fn insert(&mut self, key: Key, registration: Registration) {
        if let Some(pos) = self.small.iter().position(|(k, _)| k == &key) {
            self.small[pos] = (key, registration);
        } else if self.small.len() < self.small_threshold {
            self.small.push((key, registration));
        } else {
            self.large.insert(key, registration);
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, key: &Key) -> Option<&Registration> {
        for (k, reg) in &self.small {
            if k == key {
                return Some(reg);
            }
        }
        self.large.get(key)
    }

    /// Iterator over all key-registration pairs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Key, &Registration)> {
        self.small.iter().map(|(k, r)| (k, r)).chain(self.large.iter())
    }

    /// Finalizes the registry by assigning scoped slot indices.
    pub(crate) fn finalize(&mut self) {
        let mut next_slot = 0;
        for (_, reg) in &mut self.small {
            if reg.lifetime == Lifetime::Scoped {
                reg.scoped_slot = Some(next_slot);
                next_slot += 1;
            }
        }
        for reg in self.large.values_mut() {
            if reg.lifetime == Lifetime::Scoped {
                reg.scoped_slot = Some(next_slot);
                next_slot += 1;
            }
        }
        self.scoped_count = next_slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_cell_caches_failure() {
        let cell = SingletonCell::new();
        let first = cell.get_or_init_sync("test::Service", || {
            Err(DiError::NotFound("test::Dep"))
        });
        assert!(matches!(first, Err(DiError::Construction { .. })));

        // Second attempt must not rerun the factory.
        let second = cell.get_or_init_sync("test::Service", || {
            panic!("factory must not rerun after a cached failure")
        });
        assert!(matches!(second, Err(DiError::Construction { .. })));

        cell.reset();
        let third = cell.get_or_init_sync("test::Service", || Ok(Arc::new(7u32) as AnyArc));
        assert!(third.is_ok());
    }
}
