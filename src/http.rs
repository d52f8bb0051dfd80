//! Normalized request/response types at the transport boundary.
//!
//! The transport layer owns wire parsing; it hands the executor a
//! [`Request`] and receives a [`Response`] back. Nothing in the core reads
//! raw bytes.

use std::collections::HashMap;

use serde_json::Value;

/// HTTP method of a normalized request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Default success status for responses on this verb: 201 for creates,
    /// 200 for everything else.
    pub fn default_status(&self) -> u16 {
        match self {
            Method::Post => 201,
            _ => 200,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        };
        f.write_str(s)
    }
}

/// Normalized inbound request handed to the executor by the transport.
///
/// Headers use lowercase keys; the body is pre-parsed JSON when the
/// request carried one.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Option<Method>,
    /// Request path without the query string
    pub path: String,
    /// Path parameters filled in by route matching
    pub path_params: HashMap<String, String>,
    /// Parsed query string parameters
    pub query: HashMap<String, String>,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, if any
    pub body: Option<Value>,
}

impl Request {
    /// Builds a request for the given method and path; the builder-style
    /// methods fill in the rest.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_web::{Method, Request};
    ///
    /// let req = Request::new(Method::Post, "/pets")
    ///     .with_query("dry_run", "true")
    ///     .with_header("authorization", "Bearer token-1")
    ///     .with_body(serde_json::json!({"name": "Rex"}));
    /// assert_eq!(req.query.get("dry_run").map(String::as_str), Some("true"));
    /// ```
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method: Some(method), path: path.into(), ..Default::default() }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The method, defaulting to GET when the transport did not set one.
    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Get)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Authenticated caller identity carried in the request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), roles: Vec::new() }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Server-side session state carried in the request context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: String,
    pub data: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: HashMap::new() }
    }
}

/// Normalized outbound response returned to the transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Header name/value pairs in insertion order
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, headers: Vec::new(), body }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
