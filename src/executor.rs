//! Per-request execution pipeline.
//!
//! The executor owns the sequence match → resolve → invoke → format and
//! the translation of faults raised anywhere along it. Each request runs
//! as an independent task with its own request scope and bound request
//! context; the only state shared between concurrent requests is the
//! service container and the resource registries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::error::{CancelReason, Fault};
use crate::http::{Request, Response};
use crate::provider::ServiceProvider;
use crate::request_context::{Authenticator, RequestContext, SessionSource};
use crate::resolve::{resolve_dependencies, AcquiredSet};
use crate::resource::SchedulerContext;
use crate::response::ResponseProcessor;
use crate::route::RouteTable;
use crate::traits::Resolver;

/// Pipeline phase, used for fault attribution in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Matched,
    Resolving,
    Invoking,
    Formatting,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Matched => "matched",
            Phase::Resolving => "resolving",
            Phase::Invoking => "invoking",
            Phase::Formatting => "formatting",
        }
    }
}

/// Executor policy knobs.
#[derive(Clone, Default)]
pub struct ExecutorConfig {
    /// Deadline applied around the Invoking phase only; resolution and
    /// formatting are not covered. `None` disables the deadline.
    pub invoke_timeout: Option<Duration>,
}

/// Orchestrates the per-request pipeline.
///
/// One executor per worker, bound to that worker's [`SchedulerContext`].
/// The single entry point [`handle`](Executor::handle) is
/// middleware-friendly: it takes a normalized request and always returns a
/// normalized response, translating every fault through the taxonomy.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{
///     Args, Dependency, Executor, Method, ParamKind, Request, Route, RouteTable,
///     SchedulerContext, ServiceCollection,
/// };
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = ServiceCollection::new().build();
/// let routes = RouteTable::new().route(
///     Route::get("/pets/:id")
///         .dependency(Dependency::path("id", ParamKind::Int))
///         .handler(|args: Args| async move {
///             Ok(json!({ "id": args.int("id")? }))
///         }),
/// );
/// let executor = Executor::new(provider, routes, SchedulerContext::new());
///
/// let response = executor.handle(Request::new(Method::Get, "/pets/7")).await;
/// assert_eq!(response.status, 200);
/// assert_eq!(response.body["id"], 7);
/// # }
/// ```
pub struct Executor {
    provider: ServiceProvider,
    routes: RouteTable,
    scheduler: SchedulerContext,
    config: ExecutorConfig,
    processor: ResponseProcessor,
    metadata_builds: AtomicUsize,
}

impl Executor {
    pub fn new(provider: ServiceProvider, routes: RouteTable, scheduler: SchedulerContext) -> Self {
        Self::with_config(provider, routes, scheduler, ExecutorConfig::default())
    }

    pub fn with_config(
        provider: ServiceProvider,
        routes: RouteTable,
        scheduler: SchedulerContext,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            routes,
            scheduler,
            config,
            processor: ResponseProcessor::new(),
            metadata_builds: AtomicUsize::new(0),
        }
    }

    /// The scheduler context this executor acquires resources under.
    pub fn scheduler(&self) -> &SchedulerContext {
        &self.scheduler
    }

    /// How many route-metadata builds have run. Metadata is computed once
    /// per route and reused, so this stays at the number of distinct
    /// routes exercised.
    pub fn metadata_builds(&self) -> usize {
        self.metadata_builds.load(Ordering::SeqCst)
    }

    /// Handles one request to completion.
    pub async fn handle(&self, request: Request) -> Response {
        self.handle_cancellable(request, CancellationToken::new()).await
    }

    /// Handles one request, racing the pipeline against `token`.
    ///
    /// The transport cancels the token on client disconnect; the pipeline
    /// stops at its next suspension point, after which scoped-dependency
    /// teardowns and scope disposal still run.
    pub async fn handle_cancellable(&self, request: Request, token: CancellationToken) -> Response {
        let method = request.method();
        let matched = match self.routes.match_route(method, &request.path) {
            Some(m) => m,
            None => {
                let fault = Fault::not_found(format!("{} {}", method, request.path));
                return self.render(fault, Phase::Matched);
            }
        };

        let mut request = request;
        request.path_params = matched.path_params;
        let spec = matched.spec;
        let metadata = spec.metadata(|| {
            self.metadata_builds.fetch_add(1, Ordering::SeqCst);
        });

        // Principal/session enter the context at bind time; dependencies
        // that need them read the context, never the service they run on.
        let principal = self
            .provider
            .get_trait::<dyn Authenticator>()
            .ok()
            .and_then(|a| a.authenticate(&request));
        let session = self
            .provider
            .get_trait::<dyn SessionSource>()
            .ok()
            .and_then(|s| s.load(&request));

        let scope = self.provider.create_scope();
        let acquired = AcquiredSet::new();
        let context = RequestContext::new(request.clone(), principal, session);

        let pipeline = {
            let scope = scope.clone();
            let acquired = acquired.clone();
            let spec = spec.clone();
            let metadata = metadata.clone();
            let request = request.clone();
            let scheduler = self.scheduler.clone();
            let invoke_timeout = self.config.invoke_timeout;
            let processor = &self.processor;
            context.bind(async move {
                let args = resolve_dependencies(
                    &metadata, &request, &scope, &scheduler, &acquired,
                )
                .await
                .map_err(|f| (f, Phase::Resolving))?;

                let invocation = spec.handler.call(args);
                let value = match invoke_timeout {
                    Some(deadline) => tokio::time::timeout(deadline, invocation)
                        .await
                        .map_err(|_| {
                            (Fault::cancelled(CancelReason::Deadline), Phase::Invoking)
                        })?
                        .map_err(|f| (f, Phase::Invoking))?,
                    None => invocation.await.map_err(|f| (f, Phase::Invoking))?,
                };

                processor
                    .format(value, &spec)
                    .map_err(|f| (f, Phase::Formatting))
            })
        };

        let outcome = tokio::select! {
            result = pipeline => result,
            _ = token.cancelled() => {
                Err((Fault::cancelled(CancelReason::Disconnect), Phase::Invoking))
            }
        };

        // Teardown and disposal run on every exit path, cancellation
        // included, before the response leaves.
        let teardown_faults = acquired.teardown_all().await;
        scope.dispose_all().await;

        match self.merge(outcome, teardown_faults) {
            Ok(response) => response,
            Err((fault, phase)) => self.render(fault, phase),
        }
    }

    /// Folds teardown faults into the pipeline outcome.
    ///
    /// A teardown fault after a successful handler becomes the response;
    /// after a faulted handler the handler's fault stays primary and the
    /// teardown fault is attached as secondary (and logged either way).
    fn merge(
        &self,
        outcome: Result<Response, (Fault, Phase)>,
        teardown_faults: Vec<(&'static str, Fault)>,
    ) -> Result<Response, (Fault, Phase)> {
        if teardown_faults.is_empty() {
            return outcome;
        }
        for (label, fault) in &teardown_faults {
            tracing::error!(dependency = *label, %fault, "scoped dependency teardown failed");
        }
        let mut faults = teardown_faults.into_iter();
        let (label, first) = faults.next().expect("non-empty teardown faults");
        match outcome {
            Ok(_) => Err((
                Fault::server(format!("teardown of {label:?} failed: {first}")),
                Phase::Invoking,
            )),
            Err((primary, phase)) => Err((primary.with_secondary(first), phase)),
        }
    }

    /// Renders a fault as a wire response, logging it server-side.
    ///
    /// Client-safe faults log at debug; server-side failures log at error
    /// with full context, and their wire bodies stay generic.
    fn render(&self, fault: Fault, phase: Phase) -> Response {
        match &fault {
            Fault::Server { .. } | Fault::Construction { .. } => {
                tracing::error!(phase = phase.as_str(), %fault, "request pipeline fault");
            }
            Fault::Cancelled { .. } => {
                tracing::info!(phase = phase.as_str(), %fault, "request cancelled");
            }
            _ => {
                tracing::debug!(phase = phase.as_str(), %fault, "request rejected");
            }
        }
        Response::new(fault.status(), fault.body())
            .with_header("content-type", "application/json")
    }
}
