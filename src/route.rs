//! Route specs, dependency descriptors, and the route table.
//!
//! Dependencies are declared as explicit descriptor objects attached to a
//! route at registration time; there is no runtime reflection over
//! handler signatures. The resolver interprets the descriptor set as a
//! plain dispatch over a closed set of kinds, and the compiled per-route
//! plan is cached after the first request.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::Fault;
use crate::http::Method;
use crate::provider::Scope;
use crate::resolve::Args;
use crate::resource::{ResourceRegistry, SchedulerContext};

pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ServiceResolveFn =
    Arc<dyn Fn(Scope) -> BoxFuture<Result<(TypeId, AnyArc), Fault>> + Send + Sync>;
type ResourceAcquireFn = Arc<
    dyn Fn(Scope, SchedulerContext) -> BoxFuture<Result<(TypeId, AnyArc), Fault>> + Send + Sync,
>;
type ValidatorFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Expected shape of a path/query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
}

impl ParamKind {
    /// Coerces a raw string into a typed JSON value, or explains why it
    /// cannot. The message is safe to expose in a client fault.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self {
            ParamKind::Str => Ok(Value::String(raw.to_string())),
            ParamKind::Int => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected an integer, got {raw:?}")),
            ParamKind::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("expected a number, got {raw:?}")),
            ParamKind::Bool => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("expected a boolean, got {raw:?}")),
            },
        }
    }
}

/// A user-supplied factory with paired setup and teardown.
///
/// The generator-shaped dependency kind: `setup` runs before the handler
/// and its value lands in the resolved argument set; `teardown` runs after
/// the handler on success, fault, and cancellation alike, exactly once.
/// Implementations are shared across concurrent requests and must keep all
/// per-request state in the value they yield, never on themselves.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use ferrous_web::{Fault, ScopedDependency};
/// use std::any::Any;
/// use std::sync::Arc;
///
/// struct Transaction { id: u64 }
///
/// struct TransactionFactory;
///
/// #[async_trait]
/// impl ScopedDependency for TransactionFactory {
///     async fn setup(&self) -> Result<Arc<dyn Any + Send + Sync>, Fault> {
///         Ok(Arc::new(Transaction { id: 1 }))
///     }
///
///     async fn teardown(&self, _value: Arc<dyn Any + Send + Sync>) -> Result<(), Fault> {
///         // commit or roll back here
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ScopedDependency: Send + Sync {
    async fn setup(&self) -> Result<Arc<dyn Any + Send + Sync>, Fault>;
    async fn teardown(&self, value: Arc<dyn Any + Send + Sync>) -> Result<(), Fault>;
}

/// Declarative marker describing how one handler argument is resolved.
///
/// Attached to a route at registration time and interpreted by the
/// dependency resolver; the set of kinds is closed.
#[derive(Clone)]
pub enum Dependency {
    /// Value extracted from a path segment
    Path { name: &'static str, kind: ParamKind },
    /// Value extracted from the query string
    Query { name: &'static str, kind: ParamKind, required: bool },
    /// The parsed JSON body; listed fields must be present
    Body { required_fields: Vec<&'static str> },
    /// A service resolved from the container for this request's scope
    Service { label: &'static str, resolve: ServiceResolveFn },
    /// A resource handle acquired under the current scheduler context
    Resource { label: &'static str, acquire: ResourceAcquireFn },
    /// Framework shortcut: the normalized inbound request
    CurrentRequest,
    /// Framework shortcut: the authenticated principal (auth fault when
    /// the request is anonymous)
    CurrentPrincipal,
    /// A scoped-acquisition factory with guaranteed teardown
    Scoped { label: &'static str, factory: Arc<dyn ScopedDependency> },
}

impl Dependency {
    pub fn path(name: &'static str, kind: ParamKind) -> Self {
        Dependency::Path { name, kind }
    }

    pub fn query(name: &'static str, kind: ParamKind) -> Self {
        Dependency::Query { name, kind, required: false }
    }

    pub fn required_query(name: &'static str, kind: ParamKind) -> Self {
        Dependency::Query { name, kind, required: true }
    }

    pub fn body() -> Self {
        Dependency::Body { required_fields: Vec::new() }
    }

    /// Body that must contain each listed top-level field; a missing field
    /// produces a client fault naming it and the handler never runs.
    pub fn body_with_required(fields: &[&'static str]) -> Self {
        Dependency::Body { required_fields: fields.to_vec() }
    }

    /// A typed service resolved from the request scope.
    pub fn service<T: 'static + Send + Sync>() -> Self {
        Dependency::Service {
            label: std::any::type_name::<T>(),
            resolve: Arc::new(|scope: Scope| {
                Box::pin(async move {
                    let v = scope.get_async::<T>().await.map_err(Fault::from)?;
                    Ok((TypeId::of::<T>(), v as AnyArc))
                })
            }),
        }
    }

    /// A named service resolved from the request scope.
    pub fn named_service<T: 'static + Send + Sync>(name: &'static str) -> Self {
        Dependency::Service {
            label: std::any::type_name::<T>(),
            resolve: Arc::new(move |scope: Scope| {
                Box::pin(async move {
                    let v = scope.get_named_async::<T>(name).await.map_err(Fault::from)?;
                    Ok((TypeId::of::<T>(), v as AnyArc))
                })
            }),
        }
    }

    /// A resource handle of type `R`, acquired from the registered
    /// `ResourceRegistry<R>` under the scheduler context the executor
    /// runs on.
    pub fn resource<R: Send + Sync + 'static>() -> Self {
        Dependency::Resource {
            label: std::any::type_name::<R>(),
            acquire: Arc::new(|scope: Scope, scheduler: SchedulerContext| {
                Box::pin(async move {
                    let registry =
                        scope.get_async::<ResourceRegistry<R>>().await.map_err(Fault::from)?;
                    let handle = registry.acquire(&scheduler).await?;
                    Ok((TypeId::of::<R>(), handle as AnyArc))
                })
            }),
        }
    }

    pub fn current_request() -> Self {
        Dependency::CurrentRequest
    }

    pub fn current_principal() -> Self {
        Dependency::CurrentPrincipal
    }

    pub fn scoped(label: &'static str, factory: Arc<dyn ScopedDependency>) -> Self {
        Dependency::Scoped { label, factory }
    }
}

/// Async request handler invoked with its fully resolved argument set.
///
/// Implemented automatically for `Fn(Args) -> Future<Output = Result<Value, Fault>>`
/// closures.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, args: Args) -> Result<Value, Fault>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
{
    async fn call(&self, args: Args) -> Result<Value, Fault> {
        (self)(args).await
    }
}

/// Declared response policy for one route.
#[derive(Clone, Default)]
pub struct ResponseContract {
    /// Status override; otherwise the verb default applies (201 for POST,
    /// 200 for everything else)
    pub status: Option<u16>,
    /// Headers the response processor sets on every success response
    pub headers: Vec<(String, String)>,
    /// Shape check for the handler's return value; a violation is a
    /// server fault, never exposed as-is
    pub validator: Option<ValidatorFn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Path pattern with literal and `:param` segments.
///
/// Pattern matching algorithms are a collaborator concern; this minimal
/// matcher exists so the route table is usable standalone.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { raw: pattern.to_string(), segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a concrete path, returning extracted path parameters.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Compiled per-route resolution plan.
///
/// An immutable derived artifact of the route spec: computed once on the
/// first request that hits the route and reused for every subsequent one,
/// so descriptor interpretation cost is not paid per request.
pub struct RouteMetadata {
    pub(crate) plan: Vec<Dependency>,
}

impl RouteMetadata {
    fn compile(dependencies: &[Dependency]) -> Self {
        Self { plan: dependencies.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}

/// Immutable, process-lifetime description of one registered endpoint.
///
/// Built once at registration through [`Route`]; the executor caches the
/// compiled [`RouteMetadata`] on first match.
pub struct RouteSpec {
    pub method: Method,
    pub pattern: PathPattern,
    pub handler: Arc<dyn Handler>,
    pub dependencies: Vec<Dependency>,
    pub contract: ResponseContract,
    metadata: OnceCell<Arc<RouteMetadata>>,
}

impl RouteSpec {
    /// Returns the compiled metadata, building it on first use.
    ///
    /// `on_build` fires only when the metadata is actually computed, so
    /// the executor can use it as a build-count probe.
    pub fn metadata(&self, on_build: impl FnOnce()) -> Arc<RouteMetadata> {
        self.metadata
            .get_or_init(|| {
                on_build();
                Arc::new(RouteMetadata::compile(&self.dependencies))
            })
            .clone()
    }
}

/// Builder for a [`RouteSpec`].
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Args, Dependency, Fault, ParamKind, Route};
/// use serde_json::json;
///
/// let spec = Route::get("/pets/:id")
///     .dependency(Dependency::path("id", ParamKind::Int))
///     .handler(|args: Args| async move {
///         let id = args.value("id")?.clone();
///         Ok(json!({ "id": id }))
///     });
/// assert_eq!(spec.pattern.as_str(), "/pets/:id");
/// ```
pub struct Route {
    method: Method,
    pattern: PathPattern,
    dependencies: Vec<Dependency>,
    contract: ResponseContract,
}

impl Route {
    pub fn new(method: Method, pattern: &str) -> Self {
        Self {
            method,
            pattern: PathPattern::parse(pattern),
            dependencies: Vec::new(),
            contract: ResponseContract::default(),
        }
    }

    pub fn get(pattern: &str) -> Self {
        Self::new(Method::Get, pattern)
    }

    pub fn post(pattern: &str) -> Self {
        Self::new(Method::Post, pattern)
    }

    pub fn put(pattern: &str) -> Self {
        Self::new(Method::Put, pattern)
    }

    pub fn delete(pattern: &str) -> Self {
        Self::new(Method::Delete, pattern)
    }

    /// Attaches one dependency descriptor.
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Overrides the success status code for this route.
    pub fn status(mut self, status: u16) -> Self {
        self.contract.status = Some(status);
        self
    }

    /// Adds a header the response processor sets on every success.
    pub fn response_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.contract.headers.push((name.into(), value.into()));
        self
    }

    /// Declares a shape check for the handler's return value.
    pub fn response_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.contract.validator = Some(Arc::new(validator));
        self
    }

    /// Finishes the route with its handler.
    pub fn handler(self, handler: impl Handler + 'static) -> RouteSpec {
        RouteSpec {
            method: self.method,
            pattern: self.pattern,
            handler: Arc::new(handler),
            dependencies: self.dependencies,
            contract: self.contract,
            metadata: OnceCell::new(),
        }
    }
}

/// A matched route plus the path parameters its pattern extracted.
pub struct RouteMatch {
    pub spec: Arc<RouteSpec>,
    pub path_params: HashMap<String, String>,
}

/// Registered routes with first-match-wins lookup.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteSpec>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, spec: RouteSpec) -> Self {
        self.routes.push(Arc::new(spec));
        self
    }

    /// Finds the route matching `method` and `path`.
    pub fn match_route(&self, method: Method, path: &str) -> Option<RouteMatch> {
        for spec in &self.routes {
            if spec.method != method {
                continue;
            }
            if let Some(path_params) = spec.pattern.match_path(path) {
                return Some(RouteMatch { spec: spec.clone(), path_params });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
