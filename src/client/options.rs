//! Per-request options.

use std::fmt;
use std::io::Read;
use std::time::Duration;

/// Options for a single request.
///
/// Replaces an open-ended options map with named fields. Headers keep the
/// order in which they were added and are applied to the wire in that order.
///
/// # Examples
///
/// ```
/// use http_exchange::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::new()
///     .with_method("post")
///     .with_header("Content-Type", "text/plain")
///     .with_body(&b"hello"[..])
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(options.method, "post");
/// ```
pub struct RequestOptions {
    /// HTTP method; case-insensitive, upper-cased before it reaches the wire
    pub method: String,
    /// Request headers in application order
    pub headers: Vec<(String, String)>,
    /// Request body source, drained fully during setup
    pub body: Option<Box<dyn Read + Send>>,
    /// Per-request deadline overriding the client default
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Create options for a plain GET
    pub fn new() -> Self {
        RequestOptions {
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Set the method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Append a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body source
    pub fn with_body(mut self, body: impl Read + Send + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Override the client's default deadline for this request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .field("timeout", &self.timeout)
            .finish()
    }
}
