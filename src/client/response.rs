//! Response value model.
//!
//! A [`Response`] is built up by its exchange while transport events arrive and
//! is frozen by the single terminal transition (complete or expire). Callers
//! only ever see the frozen value: the callback receives a reference to it and
//! [`ExchangeHandle::response`](crate::ExchangeHandle::response) hands out a
//! clone once the exchange is terminal.

use crate::client::utils::is_success_status;
use bytes::Bytes;
use url::Url;

/// Status reported for an exchange whose deadline elapsed.
pub const TIMEOUT_STATUS: i32 = -1;

/// The outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    url: Url,
    ssl: bool,
    status: i32,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    timeout: bool,
}

impl Response {
    pub(crate) fn new(url: Url) -> Self {
        let ssl = url.scheme() == "https";
        Response {
            url,
            ssl,
            status: 0,
            headers: Vec::new(),
            body: None,
            timeout: false,
        }
    }

    /// Record a response header.
    ///
    /// Names compare case-insensitively; a repeated name replaces the earlier
    /// value but keeps its original position.
    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub(crate) fn complete(&mut self, status: u16, body: Option<Bytes>) {
        self.status = i32::from(status);
        self.body = body;
        self.timeout = false;
    }

    pub(crate) fn expire(&mut self) {
        self.status = TIMEOUT_STATUS;
        self.body = None;
        self.timeout = true;
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// HTTP status, or `-1` when the exchange timed out
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Response headers in arrival order
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Response body; absent on timeout or when the peer sent no content
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|body| String::from_utf8_lossy(body).into_owned())
    }

    /// Whether the URL scheme was `https`
    pub fn is_ssl(&self) -> bool {
        self.ssl
    }

    /// Whether the status is neither a client nor a server error
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Whether the deadline elapsed before the response completed
    pub fn is_timeout(&self) -> bool {
        self.timeout
    }

    /// Whether the response used a non-identity transfer encoding
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|encoding| !encoding.trim().eq_ignore_ascii_case("identity"))
            .unwrap_or(false)
    }
}
