//! Response formatting policy.

use serde_json::Value;

use crate::error::Fault;
use crate::http::Response;
use crate::route::RouteSpec;

/// Converts handler return values into wire responses.
///
/// Applies the route's declared response contract: validates the value
/// shape when a validator is declared (a violation means the handler
/// broke its own contract, a server fault), applies the declared status code or
/// the verb default (201 for POST routes, 200 otherwise), and sets
/// `content-type: application/json` plus any contract headers. Never
/// touches the request context.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{Args, ResponseProcessor, Route};
/// use serde_json::json;
///
/// let spec = Route::post("/pets").handler(|_args: Args| async move {
///     Ok(json!({ "id": 1 }))
/// });
///
/// let response = ResponseProcessor::new().format(json!({ "id": 1 }), &spec).unwrap();
/// assert_eq!(response.status, 201);
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// ```
#[derive(Default)]
pub struct ResponseProcessor;

impl ResponseProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Formats a handler return value for the given route.
    pub fn format(&self, value: Value, spec: &RouteSpec) -> Result<Response, Fault> {
        if let Some(validator) = &spec.contract.validator {
            (validator)(&value)
                .map_err(|msg| Fault::server(format!("response contract violation: {msg}")))?;
        }

        let status = spec.contract.status.unwrap_or_else(|| spec.method.default_status());
        let mut response =
            Response::new(status, value).with_header("content-type", "application/json");
        for (name, header_value) in &spec.contract.headers {
            response = response.with_header(name.clone(), header_value.clone());
        }
        Ok(response)
    }
}
