//! # ferrous-web
//!
//! Request-scoped dependency injection and execution pipeline for async
//! Rust web services.
//!
//! ## Features
//!
//! - **Type-safe lifetimes**: Singleton, Scoped (per request), and
//!   Transient services
//! - **At-most-one construction**: concurrent first resolutions of a
//!   singleton run its factory exactly once; failures are cached and
//!   re-raised until an explicit reset
//! - **Task-local request context**: the current request, principal, and
//!   session live in task-local storage, never on a service instance, so
//!   concurrent requests cannot observe each other's state
//! - **Per-context resources**: external engines and pools are built
//!   lazily per scheduler context and weak-keyed so a torn-down context's
//!   handle is never reused
//! - **Descriptor-driven resolution**: handler dependencies are explicit
//!   descriptor objects interpreted once per route, not reflection over
//!   signatures
//! - **Structured fault taxonomy**: client, auth, not-found,
//!   construction, server, and cancelled faults with safe-to-expose wire
//!   bodies
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_web::{
//!     Args, Dependency, Executor, Method, ParamKind, Request, Route, RouteTable,
//!     SchedulerContext, ServiceCollection, Resolver,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut services = ServiceCollection::new();
//! services.add_singleton(Greeter { greeting: "hello".to_string() });
//! let provider = services.build();
//!
//! let routes = RouteTable::new().route(
//!     Route::get("/greet/:name")
//!         .dependency(Dependency::path("name", ParamKind::Str))
//!         .dependency(Dependency::service::<Greeter>())
//!         .handler(|args: Args| async move {
//!             let greeter = args.service::<Greeter>()?;
//!             Ok(json!(format!("{} {}", greeter.greeting, args.text("name")?)))
//!         }),
//! );
//!
//! let executor = Executor::new(provider, routes, SchedulerContext::new());
//! let response = executor.handle(Request::new(Method::Get, "/greet/world")).await;
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body, json!("hello world"));
//! # }
//! ```
//!
//! ## Service Lifetimes
//!
//! - **Singleton**: created once per worker and shared across all requests
//! - **Scoped**: created once per request, disposed at end-of-request
//! - **Transient**: created fresh on every resolution
//!
//! ## Request isolation
//!
//! ```rust
//! use ferrous_web::{Method, Principal, Request, RequestContext};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let ctx = RequestContext::new(
//!     Request::new(Method::Get, "/me"),
//!     Some(Principal::new("alice")),
//!     None,
//! );
//! ctx.bind(async {
//!     // Visible anywhere in this task's call graph, and nowhere else.
//!     let current = RequestContext::current().unwrap();
//!     assert_eq!(current.principal().unwrap().name, "alice");
//! })
//! .await;
//! # }
//! ```

// Module declarations
pub mod cancellation;
pub mod collection;
pub mod error;
pub mod executor;
pub mod http;
pub mod key;
pub mod lifetime;
pub mod observer;
pub mod provider;
pub mod request_context;
pub mod resolve;
pub mod resource;
pub mod response;
pub mod route;
pub mod traits;

// Internal modules
mod internal;
mod registration;

use std::collections::HashMap;
use std::sync::Arc;

// Re-export core types
pub use cancellation::{CancellationError, CancellationToken};
pub use collection::ServiceCollection;
pub use error::{CancelReason, DiError, DiResult, Fault, FieldError};
pub use executor::{Executor, ExecutorConfig};
pub use http::{Method, Principal, Request, Response, Session};
pub use internal::CircularPanic;
pub use key::{key_of_type, Key};
pub use lifetime::Lifetime;
pub use observer::{DiObserver, LoggingObserver};
pub use provider::{AsyncContext, OverrideGuard, ResolverContext, Scope, ServiceProvider};
pub use request_context::{Authenticator, RequestContext, SessionSource};
pub use resolve::Args;
pub use resource::{ResourceRegistry, SchedulerContext};
pub use response::ResponseProcessor;
pub use route::{
    Dependency, Handler, ParamKind, PathPattern, ResponseContract, Route, RouteMatch,
    RouteMetadata, RouteSpec, RouteTable, ScopedDependency,
};
pub use traits::{AsyncDispose, Dispose, Resolver, ResolverCore};

// ===== Settings =====

/// Opaque startup-time settings map.
///
/// The configuration loader (outside the core) fills this in and
/// registers it as a singleton; service constructors read connection
/// strings and similar values from it. For typed access, layer
/// [`Options<T>`] on top.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Resolver, ServiceCollection, Settings};
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(
///     Settings::new().set("database_url", "postgres://localhost/app"),
/// );
///
/// let provider = services.build();
/// let settings = provider.get_required::<Settings>();
/// assert_eq!(settings.get("database_url"), Some("postgres://localhost/app"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

// ===== Options pattern =====

/// Immutable options wrapper resolved once during container setup.
///
/// Holds the final configured snapshot of `T`; resolve `Options<T>` and
/// call [`get`](Options::get) for the shared `Arc<T>`.
pub struct Options<T> {
    inner: Arc<T>,
}

impl<T> Options<T> {
    /// Creates a new `Options<T>` wrapping the given value.
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(value) }
    }

    /// Gets a clone of the inner `Arc<T>` containing the configured options.
    pub fn get(&self) -> Arc<T> {
        self.inner.clone()
    }
}

type ConfigureFn<T> = Arc<dyn Fn(&ResolverContext, &mut T) + Send + Sync>;
type ValidateFn<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Builder for options that depend on other services.
///
/// Supports a custom default, configure callbacks that can resolve other
/// registered services (e.g. [`Settings`]), post-configure normalization,
/// and fail-fast validation. `register()` installs `Options<T>` as a
/// singleton.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Options, Resolver, ServiceCollection, Settings};
///
/// #[derive(Default)]
/// struct DatabaseOptions {
///     url: String,
///     pool_size: u32,
/// }
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(Settings::new().set("database_url", "postgres://localhost/app"));
///
/// services
///     .add_options::<DatabaseOptions>()
///     .default_with(|| DatabaseOptions { url: String::new(), pool_size: 8 })
///     .configure(|resolver, options| {
///         let settings = resolver.get_required::<Settings>();
///         if let Some(url) = settings.get("database_url") {
///             options.url = url.to_string();
///         }
///     })
///     .validate(|options| {
///         if options.url.is_empty() {
///             return Err("database_url must be set".to_string());
///         }
///         Ok(())
///     })
///     .register();
///
/// let provider = services.build();
/// let options = provider.get_required::<Options<DatabaseOptions>>().get();
/// assert_eq!(options.url, "postgres://localhost/app");
/// assert_eq!(options.pool_size, 8);
/// ```
pub struct OptionsBuilder<'a, T>
where
    T: Default + Send + Sync + 'static,
{
    sc: &'a mut ServiceCollection,
    default_maker: Option<Arc<dyn Fn() -> T + Send + Sync>>,
    configures: Vec<ConfigureFn<T>>,
    post_configures: Vec<ConfigureFn<T>>,
    validates: Vec<ValidateFn<T>>,
}

impl<'a, T> OptionsBuilder<'a, T>
where
    T: Default + Send + Sync + 'static,
{
    fn new(sc: &'a mut ServiceCollection) -> Self {
        Self {
            sc,
            default_maker: None,
            configures: Vec::new(),
            post_configures: Vec::new(),
            validates: Vec::new(),
        }
    }

    /// Provide a custom default value creator (otherwise `T::default()`).
    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.default_maker = Some(Arc::new(f));
        self
    }

    /// Configure options with access to other registered services.
    /// Callbacks run in registration order.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolverContext, &mut T) + Send + Sync + 'static,
    {
        self.configures.push(Arc::new(f));
        self
    }

    /// Post-configure after all configure callbacks, for computed values
    /// and normalization.
    pub fn post_configure<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolverContext, &mut T) + Send + Sync + 'static,
    {
        self.post_configures.push(Arc::new(f));
        self
    }

    /// Validate the final options.
    ///
    /// Runs after all configure steps when `Options<T>` is first
    /// resolved; a failure panics (fail-fast for misconfiguration).
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validates.push(Arc::new(f));
        self
    }

    /// Registers `Options<T>` as a singleton built from the configured
    /// steps: default → configure (in order) → post-configure → validate.
    pub fn register(self) {
        let default_maker = self.default_maker;
        let configures = self.configures;
        let post_configures = self.post_configures;
        let validates = self.validates;

        self.sc.add_singleton_factory::<Options<T>, _>(move |resolver| {
            let mut value: T = match &default_maker {
                Some(mk) => (mk)(),
                None => T::default(),
            };
            for c in &configures {
                c(resolver, &mut value);
            }
            for pc in &post_configures {
                pc(resolver, &mut value);
            }
            for v in &validates {
                if let Err(msg) = v(&value) {
                    panic!(
                        "Options<{}> validation failed: {}",
                        std::any::type_name::<T>(),
                        msg
                    );
                }
            }
            Options::new(value)
        });
    }
}

impl ServiceCollection {
    /// Start building `Options<T>`. Call `.register()` to finalize.
    pub fn add_options<T>(&mut self) -> OptionsBuilder<'_, T>
    where
        T: Default + Send + Sync + 'static,
    {
        OptionsBuilder::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_singleton_resolution() {
        let mut sc = ServiceCollection::new();
        sc.add_singleton(42usize);

        let sp = sc.build();
        let a = sp.get_required::<usize>();
        let b = sp.get_required::<usize>();

        assert_eq!(*a, 42);
        assert!(Arc::ptr_eq(&a, &b)); // Same instance
    }

    #[test]
    fn test_transient_resolution() {
        let mut sc = ServiceCollection::new();
        let counter = Arc::new(Mutex::new(0));
        let counter_clone = counter.clone();

        sc.add_transient_factory::<String, _>(move |_| {
            let mut c = counter_clone.lock().unwrap();
            *c += 1;
            format!("instance-{}", *c)
        });

        let sp = sc.build();
        let a = sp.get_required::<String>();
        let b = sp.get_required::<String>();

        assert_eq!(a.as_str(), "instance-1");
        assert_eq!(b.as_str(), "instance-2");
        assert!(!Arc::ptr_eq(&a, &b)); // Different instances
    }

    #[test]
    fn test_options_pattern() {
        #[derive(Default)]
        struct TestConfig {
            value: i32,
        }

        let mut sc = ServiceCollection::new();
        sc.add_options::<TestConfig>()
            .configure(|_resolver, config| {
                config.value = 42;
            })
            .register();

        let sp = sc.build();
        let options = sp.get_required::<Options<TestConfig>>();
        assert_eq!(options.get().value, 42);
    }

    #[test]
    fn test_settings_lookup() {
        let settings = Settings::new().set("a", "1");
        assert_eq!(settings.get("a"), Some("1"));
        assert_eq!(settings.get_or("missing", "fallback"), "fallback");
    }
}
