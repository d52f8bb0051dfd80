//! Error types for the container and the request pipeline.
//!
//! Two layers: [`DiError`] covers container-level resolution failures, and
//! [`Fault`] is the classified error condition that travels through the
//! execution pipeline and maps onto a wire response.

use std::fmt;

/// Dependency injection errors.
///
/// Represents the error conditions that can occur during service
/// registration, resolution, or container operations.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{DiError, ServiceCollection, Resolver};
///
/// let provider = ServiceCollection::new().build();
/// match provider.get::<String>() {
///     Err(DiError::NotFound(type_name)) => {
///         assert_eq!(type_name, "alloc::string::String");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub enum DiError {
    /// Service not registered
    NotFound(&'static str),
    /// Type downcast failed
    TypeMismatch(&'static str),
    /// Circular dependency detected (includes path)
    Circular(Vec<&'static str>),
    /// Invalid lifetime resolution (e.g., scoped from root)
    WrongLifetime(&'static str),
    /// Maximum recursion depth exceeded
    DepthExceeded(usize),
    /// A singleton or resource constructor failed. Cached on the failing
    /// key and re-raised on every subsequent resolution until reset.
    Construction {
        /// Type or trait name of the failing registration
        service: &'static str,
        /// Message from the original construction failure
        message: String,
    },
    /// Service registered with an async factory but resolved through the
    /// sync API
    AsyncOnly(&'static str),
}

impl fmt::Display for DiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiError::NotFound(name) => write!(f, "Service not found: {}", name),
            DiError::TypeMismatch(name) => write!(f, "Type mismatch for: {}", name),
            DiError::Circular(path) => {
                write!(f, "Circular dependency: {}", path.join(" -> "))
            }
            DiError::WrongLifetime(msg) => write!(f, "Lifetime error: {}", msg),
            DiError::DepthExceeded(depth) => write!(f, "Max depth {} exceeded", depth),
            DiError::Construction { service, message } => {
                write!(f, "Construction of {} failed: {}", service, message)
            }
            DiError::AsyncOnly(name) => {
                write!(f, "{} requires async resolution (get_async)", name)
            }
        }
    }
}

impl std::error::Error for DiError {}

/// Result type for DI operations.
pub type DiResult<T> = Result<T, DiError>;

/// Field-level detail attached to a [`Fault::Client`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Name of the offending path/query/body field
    pub field: String,
    /// Human-readable reason, safe to expose to the caller
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

/// Why an in-flight request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The transport disconnected mid-request
    Disconnect,
    /// The executor's invoke deadline elapsed
    Deadline,
}

/// Classified error condition propagated through the execution pipeline.
///
/// Faults raised during dependency resolution are translated by the
/// executor before the handler ever runs; faults raised by the handler
/// propagate through scoped-dependency teardown first. Client-facing
/// variants (`Client`, `Auth`, `NotFound`) carry structured detail that is
/// safe to expose; `Construction` and `Server` render a generic body and
/// are logged with full context server-side.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Fault, FieldError};
///
/// let fault = Fault::client(vec![FieldError::new("age", "expected an integer")]);
/// assert_eq!(fault.status(), 422);
///
/// let fault = Fault::not_found("user 42");
/// assert_eq!(fault.status(), 404);
/// ```
#[derive(Debug, Clone)]
pub enum Fault {
    /// Malformed or invalid request data, with field-level detail
    Client { fields: Vec<FieldError> },
    /// No or invalid principal for a dependency that requires one
    Auth { reason: String },
    /// The referenced entity is absent (service/resource resolved fine)
    NotFound { what: String },
    /// A singleton service or external resource failed to build
    Construction { service: String, message: String },
    /// Uncaught handler error or response contract violation. `secondary`
    /// carries a teardown fault that occurred after this one.
    Server {
        detail: String,
        secondary: Option<Box<Fault>>,
    },
    /// Client disconnect or deadline exceeded
    Cancelled { reason: CancelReason },
}

impl Fault {
    /// Builds a `Client` fault from field errors.
    pub fn client(fields: Vec<FieldError>) -> Self {
        Fault::Client { fields }
    }

    /// Builds a `Client` fault naming a single offending field.
    pub fn client_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Fault::Client { fields: vec![FieldError::new(field, reason)] }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Fault::Auth { reason: reason.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Fault::NotFound { what: what.into() }
    }

    pub fn construction(service: impl Into<String>, message: impl Into<String>) -> Self {
        Fault::Construction { service: service.into(), message: message.into() }
    }

    pub fn server(detail: impl Into<String>) -> Self {
        Fault::Server { detail: detail.into(), secondary: None }
    }

    pub fn cancelled(reason: CancelReason) -> Self {
        Fault::Cancelled { reason }
    }

    /// Attaches a secondary fault (e.g. a teardown failure observed after
    /// the primary fault). Only `Server` carries the secondary; for other
    /// variants the secondary is dropped here and must be logged by the
    /// caller.
    pub fn with_secondary(self, secondary: Fault) -> Self {
        match self {
            Fault::Server { detail, .. } => Fault::Server {
                detail,
                secondary: Some(Box::new(secondary)),
            },
            other => other,
        }
    }

    /// HTTP status code this fault maps to.
    pub fn status(&self) -> u16 {
        match self {
            Fault::Client { .. } => 422,
            Fault::Auth { .. } => 401,
            Fault::NotFound { .. } => 404,
            Fault::Construction { .. } => 503,
            Fault::Server { .. } => 500,
            Fault::Cancelled { reason: CancelReason::Disconnect } => 499,
            Fault::Cancelled { reason: CancelReason::Deadline } => 504,
        }
    }

    /// Machine-readable error code used in the wire body.
    pub fn code(&self) -> &'static str {
        match self {
            Fault::Client { .. } => "validation_failed",
            Fault::Auth { .. } => "unauthorized",
            Fault::NotFound { .. } => "not_found",
            Fault::Construction { .. } => "service_unavailable",
            Fault::Server { .. } => "internal_error",
            Fault::Cancelled { .. } => "cancelled",
        }
    }

    /// Structured wire body for this fault.
    ///
    /// `Client`, `Auth`, and `NotFound` expose their detail; `Construction`
    /// and `Server` deliberately do not leak internals.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Fault::Client { fields } => serde_json::json!({
                "error": self.code(),
                "fields": fields,
            }),
            Fault::Auth { reason } => serde_json::json!({
                "error": self.code(),
                "reason": reason,
            }),
            Fault::NotFound { what } => serde_json::json!({
                "error": self.code(),
                "detail": what,
            }),
            Fault::Cancelled { .. } => serde_json::json!({
                "error": self.code(),
            }),
            // No internal detail leaks for server-side failures.
            Fault::Construction { .. } | Fault::Server { .. } => serde_json::json!({
                "error": self.code(),
            }),
        }
    }

    /// True for faults whose wire body carries structured detail.
    pub fn is_safe_to_expose(&self) -> bool {
        matches!(
            self,
            Fault::Client { .. } | Fault::Auth { .. } | Fault::NotFound { .. }
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Client { fields } => {
                write!(f, "validation failed:")?;
                for fe in fields {
                    write!(f, " {}: {};", fe.field, fe.reason)?;
                }
                Ok(())
            }
            Fault::Auth { reason } => write!(f, "unauthorized: {}", reason),
            Fault::NotFound { what } => write!(f, "not found: {}", what),
            Fault::Construction { service, message } => {
                write!(f, "construction of {} failed: {}", service, message)
            }
            Fault::Server { detail, secondary } => {
                write!(f, "server fault: {}", detail)?;
                if let Some(s) = secondary {
                    write!(f, " (secondary: {})", s)?;
                }
                Ok(())
            }
            Fault::Cancelled { reason: CancelReason::Disconnect } => {
                write!(f, "cancelled: client disconnected")
            }
            Fault::Cancelled { reason: CancelReason::Deadline } => {
                write!(f, "cancelled: deadline exceeded")
            }
        }
    }
}

impl std::error::Error for Fault {}

// Container failures surfacing mid-pipeline: a cached construction failure
// keeps its identity, everything else is a server-side misconfiguration.
impl From<DiError> for Fault {
    fn from(err: DiError) -> Self {
        match err {
            DiError::Construction { service, message } => Fault::Construction {
                service: service.to_string(),
                message,
            },
            other => Fault::server(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_fault_names_fields_in_body() {
        let fault = Fault::client_field("email", "missing required field");
        let body = fault.body();
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["fields"][0]["field"], "email");
    }

    #[test]
    fn server_fault_body_is_generic() {
        let fault = Fault::server("sqlx pool exhausted on shard 3");
        let body = fault.body();
        assert_eq!(body["error"], "internal_error");
        assert!(body.get("detail").is_none());
    }

    #[test]
    fn construction_di_error_keeps_identity() {
        let err = DiError::Construction {
            service: "app::Database",
            message: "connection refused".into(),
        };
        match Fault::from(err) {
            Fault::Construction { service, .. } => assert_eq!(service, "app::Database"),
            other => panic!("unexpected fault: {other}"),
        }
    }

    #[test]
    fn secondary_attaches_to_server_faults_only() {
        let primary = Fault::server("handler panicked");
        let merged = primary.with_secondary(Fault::server("teardown failed"));
        match merged {
            Fault::Server { secondary: Some(s), .. } => {
                assert_eq!(s.status(), 500);
            }
            other => panic!("unexpected fault: {other}"),
        }
    }
}
