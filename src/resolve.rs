//! Dependency resolution for one request.
//!
//! Interprets a route's compiled descriptor plan against the inbound
//! request and produces a fully resolved [`Args`] set, or fails with a
//! structured fault before the handler ever runs. Resolution of one
//! request has no observable side effects on any other concurrently
//! executing request: extracted values and scoped setups land in
//! request-owned storage only.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Fault, FieldError};
use crate::http::{Principal, Request};
use crate::provider::Scope;
use crate::request_context::RequestContext;
use crate::resource::SchedulerContext;
use crate::route::{AnyArc, Dependency, RouteMetadata, ScopedDependency};

/// Fully resolved argument set handed to a handler.
///
/// Path/query values are keyed by descriptor name; services and resources
/// by their concrete type. All lookups fail with a server fault when the
/// handler asks for something its route never declared: that mismatch is
/// a programming error, not client input.
#[derive(Default)]
pub struct Args {
    values: HashMap<&'static str, Value>,
    body: Option<Value>,
    services: HashMap<TypeId, AnyArc>,
    resources: HashMap<TypeId, AnyArc>,
    scoped: HashMap<&'static str, AnyArc>,
    request: Option<Request>,
    principal: Option<Principal>,
}

impl Args {
    /// Coerced path/query value by descriptor name.
    pub fn value(&self, name: &str) -> Result<&Value, Fault> {
        self.values
            .get(name)
            .ok_or_else(|| Fault::server(format!("undeclared value dependency {name:?}")))
    }

    /// Convenience accessor for integer values.
    pub fn int(&self, name: &str) -> Result<i64, Fault> {
        self.value(name)?
            .as_i64()
            .ok_or_else(|| Fault::server(format!("value {name:?} is not an integer")))
    }

    /// Convenience accessor for string values.
    pub fn text(&self, name: &str) -> Result<&str, Fault> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| Fault::server(format!("value {name:?} is not a string")))
    }

    /// The parsed request body.
    pub fn body(&self) -> Result<&Value, Fault> {
        self.body
            .as_ref()
            .ok_or_else(|| Fault::server("no body dependency declared"))
    }

    /// A service declared with [`Dependency::service`].
    pub fn service<T: 'static + Send + Sync>(&self) -> Result<Arc<T>, Fault> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or_else(|| {
                Fault::server(format!(
                    "undeclared service dependency {}",
                    std::any::type_name::<T>()
                ))
            })?
            .downcast::<T>()
            .map_err(|_| Fault::server(format!("service type mismatch for {}", std::any::type_name::<T>())))
    }

    /// A resource handle declared with [`Dependency::resource`].
    pub fn resource<R: 'static + Send + Sync>(&self) -> Result<Arc<R>, Fault> {
        self.resources
            .get(&TypeId::of::<R>())
            .cloned()
            .ok_or_else(|| {
                Fault::server(format!(
                    "undeclared resource dependency {}",
                    std::any::type_name::<R>()
                ))
            })?
            .downcast::<R>()
            .map_err(|_| Fault::server(format!("resource type mismatch for {}", std::any::type_name::<R>())))
    }

    /// The value yielded by a scoped-acquisition dependency.
    pub fn scoped<T: 'static + Send + Sync>(&self, label: &str) -> Result<Arc<T>, Fault> {
        self.scoped
            .get(label)
            .cloned()
            .ok_or_else(|| Fault::server(format!("undeclared scoped dependency {label:?}")))?
            .downcast::<T>()
            .map_err(|_| Fault::server(format!("scoped value type mismatch for {label:?}")))
    }

    /// The inbound request (declared with [`Dependency::current_request`]).
    pub fn request(&self) -> Result<&Request, Fault> {
        self.request
            .as_ref()
            .ok_or_else(|| Fault::server("undeclared request dependency"))
    }

    /// The authenticated principal (declared with
    /// [`Dependency::current_principal`]).
    pub fn principal(&self) -> Result<&Principal, Fault> {
        self.principal
            .as_ref()
            .ok_or_else(|| Fault::server("undeclared principal dependency"))
    }
}

struct AcquiredDependency {
    label: &'static str,
    factory: Arc<dyn ScopedDependency>,
    value: Arc<dyn Any + Send + Sync>,
}

/// Scoped-acquisition setups recorded during resolution.
///
/// Shared between the pipeline future and the executor so teardown runs
/// even when the pipeline future is dropped by cancellation. Draining on
/// teardown makes the run exactly-once.
#[derive(Clone, Default)]
pub(crate) struct AcquiredSet {
    inner: Arc<Mutex<Vec<AcquiredDependency>>>,
}

impl AcquiredSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn record(&self, label: &'static str, factory: Arc<dyn ScopedDependency>, value: AnyArc) {
        self.inner.lock().push(AcquiredDependency { label, factory, value });
    }

    /// Runs every recorded teardown in reverse acquisition order,
    /// collecting faults instead of short-circuiting so later teardowns
    /// still run.
    pub(crate) async fn teardown_all(&self) -> Vec<(&'static str, Fault)> {
        let mut acquired = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut *inner)
        };
        let mut faults = Vec::new();
        while let Some(dep) = acquired.pop() {
            if let Err(fault) = dep.factory.teardown(dep.value).await {
                faults.push((dep.label, fault));
            }
        }
        faults
    }
}

/// Resolves a route's compiled plan into an [`Args`] set.
///
/// Runs inside the bound request context. Value coercion failures produce
/// client faults naming the field; missing principals produce auth faults;
/// container and resource failures map through the fault taxonomy. Scoped
/// setups are recorded in `acquired` the moment they succeed, which is
/// what guarantees their teardown on every exit path.
pub(crate) async fn resolve_dependencies(
    metadata: &RouteMetadata,
    request: &Request,
    scope: &Scope,
    scheduler: &SchedulerContext,
    acquired: &AcquiredSet,
) -> Result<Args, Fault> {
    let mut args = Args::default();

    for dependency in &metadata.plan {
        match dependency {
            Dependency::Path { name, kind } => {
                let raw = request.path_params.get(*name).ok_or_else(|| {
                    Fault::server(format!("path parameter {name:?} not captured by route pattern"))
                })?;
                let value = kind
                    .coerce(raw)
                    .map_err(|reason| Fault::client_field(*name, reason))?;
                args.values.insert(*name, value);
            }
            Dependency::Query { name, kind, required } => match request.query.get(*name) {
                Some(raw) => {
                    let value = kind
                        .coerce(raw)
                        .map_err(|reason| Fault::client_field(*name, reason))?;
                    args.values.insert(*name, value);
                }
                None if *required => {
                    return Err(Fault::client_field(*name, "missing required query parameter"));
                }
                None => {
                    args.values.insert(*name, Value::Null);
                }
            },
            Dependency::Body { required_fields } => {
                let body = request
                    .body
                    .as_ref()
                    .ok_or_else(|| Fault::client_field("body", "missing request body"))?;
                let missing: Vec<FieldError> = required_fields
                    .iter()
                    .filter(|field| body.get(**field).is_none())
                    .map(|field| FieldError::new(*field, "missing required field"))
                    .collect();
                if !missing.is_empty() {
                    return Err(Fault::client(missing));
                }
                args.body = Some(body.clone());
            }
            Dependency::Service { resolve, .. } => {
                let (type_id, instance) = (resolve)(scope.clone()).await?;
                args.services.insert(type_id, instance);
            }
            Dependency::Resource { acquire, .. } => {
                let (type_id, handle) = (acquire)(scope.clone(), scheduler.clone()).await?;
                args.resources.insert(type_id, handle);
            }
            Dependency::CurrentRequest => {
                let ctx = RequestContext::current()?;
                args.request = Some(ctx.request().clone());
            }
            Dependency::CurrentPrincipal => {
                let ctx = RequestContext::current()?;
                args.principal = Some(ctx.require_principal()?.clone());
            }
            Dependency::Scoped { label, factory } => {
                let value = factory.setup().await?;
                acquired.record(*label, factory.clone(), value.clone());
                args.scoped.insert(*label, value);
            }
        }
    }

    Ok(args)
}
