//! Cancellation token support for the request pipeline.
//!
//! The transport layer holds a token per connection and cancels it on
//! client disconnect; the executor races the pipeline against it so
//! in-flight resolution and invocation stop at their next suspension
//! point. Scoped-dependency teardown still runs after cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// A token that signals cancellation across async operations.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::CancellationToken;
///
/// # async fn example() {
/// let token = CancellationToken::new();
///
/// tokio::select! {
///     _ = some_operation() => { /* completed */ }
///     _ = token.cancelled() => { /* cancelled */ }
/// }
/// # }
/// # async fn some_operation() {}
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationTokenInner>,
}

struct CancellationTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    parent: Option<CancellationToken>,
    created_at: Instant,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parent: None,
                created_at: Instant::now(),
            }),
        }
    }

    /// Creates a child token that is cancelled when either it or the
    /// parent token is cancelled. Useful for connection → request
    /// hierarchies.
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(CancellationTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
                created_at: Instant::now(),
            }),
        }
    }

    /// Cancels the token, signaling that associated operations should stop.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if cancellation has been requested on this token or
    /// any ancestor.
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if let Some(parent) = &self.inner.parent {
            return parent.is_cancelled();
        }
        false
    }

    /// Returns an error if the token is cancelled.
    pub fn throw_if_cancelled(&self) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::new("Operation was cancelled"))
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested. Pairs with
    /// `tokio::select!` to race an operation against cancellation.
    pub async fn cancelled(&self) {
        let own = async {
            loop {
                // Register interest before re-checking to avoid a missed
                // notify between check and await.
                let notified = self.inner.notify.notified();
                if self.inner.cancelled.load(Ordering::Acquire) {
                    return;
                }
                notified.await;
            }
        };
        match &self.inner.parent {
            None => own.await,
            Some(parent) => {
                let parent_cancelled = Box::pin(parent.cancelled());
                tokio::select! {
                    _ = own => {}
                    _ = parent_cancelled => {}
                }
            }
        }
    }

    /// Elapsed time since this token was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    /// Creates a token that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            token_clone.cancel();
        });
        token
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for cancellation operations.
#[derive(Debug, Clone)]
pub struct CancellationError {
    message: String,
}

impl CancellationError {
    /// Creates a new cancellation error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for CancellationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CancellationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_future_wakes_on_cancel() {
        let token = CancellationToken::new();
        let clone = token.clone();
        let waiter = tokio::spawn(async move { clone.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn child_observes_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child waiter should wake");
    }
}
