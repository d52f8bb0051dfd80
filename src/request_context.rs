//! Task-local request context.
//!
//! Per-request state ({request, principal, session}) lives in a
//! `tokio::task_local!` slot, never on a service instance. Binding scopes
//! the context to exactly one task's call graph: a singleton service
//! invoked concurrently by two requests observes two different contexts,
//! and a task that never bound one gets a "no active request" fault from
//! [`RequestContext::current`]. Isolation holds by construction, not by
//! discipline.

use std::sync::Arc;

use crate::error::Fault;
use crate::http::{Principal, Request, Session};

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Per-task record of the in-flight request.
///
/// Cheap to clone (`Arc` inside). Readable anywhere inside the bound
/// task's call graph via [`RequestContext::current`], including from
/// singleton services. Each concurrently running request sees only its
/// own context.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Method, Principal, Request, RequestContext};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ctx = RequestContext::new(
///     Request::new(Method::Get, "/me"),
///     Some(Principal::new("alice")),
///     None,
/// );
///
/// ctx.bind(async {
///     let current = RequestContext::current().unwrap();
///     assert_eq!(current.principal().unwrap().name, "alice");
/// })
/// .await;
///
/// // Outside a bound task there is no active request.
/// assert!(RequestContext::current().is_err());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    request: Request,
    principal: Option<Principal>,
    session: Option<Session>,
}

impl RequestContext {
    pub fn new(request: Request, principal: Option<Principal>, session: Option<Session>) -> Self {
        Self { inner: Arc::new(ContextInner { request, principal, session }) }
    }

    /// Runs `fut` with this context bound to the current task.
    ///
    /// The context is visible to everything `fut` awaits (resolvers,
    /// services, the handler) and to nothing else. It is discarded when
    /// `fut` completes or is cancelled.
    pub async fn bind<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT.scope(self, fut).await
    }

    /// Returns the context bound to the current task.
    ///
    /// Fails with a "no active request" server fault when called outside a
    /// bound task. The executor binds a context before resolution starts,
    /// so inside the pipeline this only fails on misuse.
    pub fn current() -> Result<RequestContext, Fault> {
        CURRENT
            .try_with(|ctx| ctx.clone())
            .map_err(|_| Fault::server("no active request context"))
    }

    pub fn request(&self) -> &Request {
        &self.inner.request
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.inner.principal.as_ref()
    }

    pub fn session(&self) -> Option<&Session> {
        self.inner.session.as_ref()
    }

    /// The principal, or an auth fault when the request is anonymous.
    pub fn require_principal(&self) -> Result<&Principal, Fault> {
        self.inner
            .principal
            .as_ref()
            .ok_or_else(|| Fault::auth("authentication required"))
    }
}

/// Derives the caller identity from an inbound request.
///
/// Registered as a singleton trait in the container when the application
/// authenticates requests; the executor consults it while binding the
/// request context. Anonymous requests get `None` and only fault when a
/// dependency actually requires a principal.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &Request) -> Option<Principal>;
}

/// Loads server-side session state for an inbound request.
///
/// Registered as a singleton trait in the container when the application
/// uses sessions.
pub trait SessionSource: Send + Sync {
    fn load(&self, request: &Request) -> Option<Session>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[tokio::test]
    async fn context_is_invisible_outside_bind() {
        assert!(RequestContext::current().is_err());
        let ctx = RequestContext::new(Request::new(Method::Get, "/"), None, None);
        ctx.bind(async {
            assert!(RequestContext::current().is_ok());
        })
        .await;
        assert!(RequestContext::current().is_err());
    }

    #[tokio::test]
    async fn concurrent_tasks_see_their_own_principals() {
        let make = |name: &str| {
            RequestContext::new(
                Request::new(Method::Get, "/whoami"),
                Some(Principal::new(name)),
                None,
            )
        };

        let a = tokio::spawn(make("alice").bind(async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            RequestContext::current().unwrap().principal().unwrap().name.clone()
        }));
        let b = tokio::spawn(make("bob").bind(async {
            RequestContext::current().unwrap().principal().unwrap().name.clone()
        }));

        assert_eq!(a.await.unwrap(), "alice");
        assert_eq!(b.await.unwrap(), "bob");
    }
}
