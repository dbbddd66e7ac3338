//! Per-request exchange state machine.
//!
//! An [`Exchange`] adapts transport events into one finished [`Response`] and a
//! single callback invocation.
//!
//! # State Machine
//!
//! ```text
//! Configured ──submit──▶ InFlight ──complete──▶ Completed
//!                            └──────expire────▶ Expired
//! ```
//!
//! Error capture is a side channel: `on_exception` and `on_connection_failed`
//! store the first error they see and never cause a transition. A callback that
//! returns `Err` or panics is funneled into the same slot. Captured errors are
//! only surfaced by [`ExchangeHandle::wait`] (or its variants); if nobody waits,
//! they are never reported.
//!
//! # Threading
//!
//! Every [`ExchangeEvents`] method runs on a thread chosen by the transport.
//! The callback therefore runs off the thread that issued the request, and it
//! must not wait on its own exchange: completion is signalled only after the
//! callback returns.

use crate::client::options::RequestOptions;
use crate::client::registry::Registry;
use crate::client::response::Response;
use crate::client::transport::OutboundRequest;
use crate::client::utils::{normalize_method, panic_message, parse_header};
use crate::error::{ExchangeError, Result};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use url::Url;
use uuid::Uuid;

/// What a callback returns; `Err` is captured as [`ExchangeError::Callback`].
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A stored response callback.
pub type Callback = Box<dyn FnOnce(&Response) -> CallbackResult + Send>;

/// Identity of an exchange within its client's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generate a fresh identity
    pub fn new() -> Self {
        ExchangeId(Uuid::new_v4())
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Lifecycle state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Set up but not yet handed to the transport
    Configured,
    /// Submitted; waiting for transport events
    InFlight,
    /// Full response received
    Completed,
    /// Deadline elapsed before completion
    Expired,
}

impl ExchangeState {
    /// Whether this state is final
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Expired)
    }
}

/// The fixed set of events a transport delivers for one exchange.
///
/// For a single exchange, headers arrive before the terminal event, and at most
/// one of `on_response_complete` / `on_expire` is delivered. `on_finished` is
/// the transport's last word on the exchange, sent after any other event.
pub trait ExchangeEvents: Send + Sync {
    /// A response header arrived
    fn on_response_header(&self, name: &str, value: &str);

    /// The full response was read
    fn on_response_complete(&self, status: u16, body: Bytes);

    /// The deadline elapsed before completion
    fn on_expire(&self);

    /// The peer sent something the transport could not handle
    fn on_exception(&self, error: ExchangeError);

    /// The connection could not be established or was lost
    fn on_connection_failed(&self, error: ExchangeError);

    /// The transport will deliver no further events
    fn on_finished(&self);
}

/// Per-exchange completion signal.
struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
    notify: Notify,
}

impl Completion {
    fn new() -> Self {
        Completion {
            done: Mutex::new(false),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn fire(&self) {
        let mut done = self.done.lock();
        if *done {
            return;
        }
        *done = true;
        self.cond.notify_all();
        self.notify.notify_waiters();
    }

    fn is_done(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    fn wait_until(&self, deadline: Instant) -> bool {
        let mut done = self.done.lock();
        while !*done {
            if self.cond.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }

    async fn wait_async(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

struct ExchangeInner {
    state: ExchangeState,
    response: Response,
    callback: Option<Callback>,
}

/// State machine for one outbound request/response cycle.
pub(crate) struct Exchange {
    id: ExchangeId,
    url: Url,
    method: Method,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<Bytes>,
    inner: Mutex<ExchangeInner>,
    /// First captured asynchronous error
    error: OnceCell<ExchangeError>,
    completion: Completion,
    registry: Weak<Registry>,
}

impl Exchange {
    /// Configure a new exchange.
    ///
    /// The request body source, if any, is drained here so the transport only
    /// ever sees bytes.
    pub(crate) fn setup(
        url: &str,
        options: RequestOptions,
        callback: Callback,
        registry: Weak<Registry>,
    ) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(ExchangeError::Configuration("missing URL".to_string()));
        }
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExchangeError::Configuration(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ExchangeError::Configuration(format!("URL has no host: {}", url)));
        }

        let method = normalize_method(&options.method)?;
        let headers = options
            .headers
            .iter()
            .map(|(name, value)| parse_header(name, value))
            .collect::<Result<Vec<_>>>()?;

        let body = match options.body {
            Some(mut source) => {
                let mut buf = Vec::new();
                source.read_to_end(&mut buf)?;
                Some(Bytes::from(buf))
            }
            None => None,
        };

        Ok(Exchange {
            id: ExchangeId::new(),
            url: url.clone(),
            method,
            headers,
            body,
            inner: Mutex::new(ExchangeInner {
                state: ExchangeState::Configured,
                response: Response::new(url),
                callback: Some(callback),
            }),
            error: OnceCell::new(),
            completion: Completion::new(),
            registry,
        })
    }

    pub(crate) fn id(&self) -> ExchangeId {
        self.id
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn state(&self) -> ExchangeState {
        self.inner.lock().state
    }

    /// The request as the transport should send it
    pub(crate) fn outbound(&self) -> OutboundRequest {
        OutboundRequest {
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Move from `Configured` to `InFlight` on submission.
    pub(crate) fn mark_in_flight(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ExchangeState::Configured {
            inner.state = ExchangeState::InFlight;
        }
    }

    /// The frozen response, once terminal
    pub(crate) fn response(&self) -> Option<Response> {
        let inner = self.inner.lock();
        inner.state.is_terminal().then(|| inner.response.clone())
    }

    pub(crate) fn error(&self) -> Option<ExchangeError> {
        self.error.get().cloned()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.completion.is_done()
    }

    /// Block until the transport is done with this exchange, then re-raise any
    /// captured error.
    pub(crate) fn await_completion(&self) -> Result<()> {
        self.completion.wait();
        self.surface()
    }

    /// Like [`await_completion`](Self::await_completion) but gives up at
    /// `deadline`; `Ok(false)` means the exchange is still running.
    pub(crate) fn await_until(&self, deadline: Instant) -> Result<bool> {
        if !self.completion.wait_until(deadline) {
            return Ok(false);
        }
        self.surface().map(|()| true)
    }

    pub(crate) async fn completed(&self) -> Result<()> {
        self.completion.wait_async().await;
        self.surface()
    }

    fn surface(&self) -> Result<()> {
        match self.error.get() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Store `error` unless an earlier one is already held.
    fn capture(&self, error: ExchangeError) {
        let description = error.to_string();
        if self.error.set(error).is_ok() {
            tracing::debug!(exchange = %self.id, error = %description, "captured exchange error");
        } else {
            tracing::trace!(exchange = %self.id, error = %description, "ignoring later exchange error");
        }
    }

    /// Release waiters on an exchange the client has given up tracking.
    ///
    /// The transport is not told; if it still reports events they are applied
    /// as usual, but waiters have already seen `error`.
    pub(crate) fn abandon(&self, error: ExchangeError) {
        if self.completion.is_done() {
            return;
        }
        self.capture(error);
        self.completion.fire();
    }

    fn clear(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }

    /// Perform the single terminal transition; returns `false` if one already
    /// happened.
    fn finish(&self, next: ExchangeState, apply: impl FnOnce(&mut Response)) -> bool {
        let (response, callback) = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = next;
            apply(&mut inner.response);
            (inner.response.clone(), inner.callback.take())
        };

        self.clear();
        if let Some(callback) = callback {
            self.run_callback(callback, &response);
        }
        self.completion.fire();
        true
    }

    /// Invoke the callback, capturing its failure instead of letting it reach
    /// the transport thread.
    fn run_callback(&self, callback: Callback, response: &Response) {
        match panic::catch_unwind(AssertUnwindSafe(|| callback(response))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.on_exception(ExchangeError::Callback(error.to_string())),
            Err(payload) => {
                self.on_exception(ExchangeError::Callback(panic_message(payload.as_ref())))
            }
        }
    }
}

impl ExchangeEvents for Exchange {
    fn on_response_header(&self, name: &str, value: &str) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        tracing::trace!(exchange = %self.id, header = name, "response header");
        inner.response.set_header(name, value);
    }

    fn on_response_complete(&self, status: u16, body: Bytes) {
        let body = (!body.is_empty()).then_some(body);
        if self.finish(ExchangeState::Completed, |response| response.complete(status, body)) {
            tracing::debug!(exchange = %self.id, url = %self.url, status, "exchange completed");
        }
    }

    fn on_expire(&self) {
        if self.finish(ExchangeState::Expired, Response::expire) {
            tracing::debug!(exchange = %self.id, url = %self.url, "exchange expired");
        }
    }

    fn on_exception(&self, error: ExchangeError) {
        self.capture(error);
    }

    fn on_connection_failed(&self, error: ExchangeError) {
        self.capture(error);
    }

    fn on_finished(&self) {
        // Failed exchanges never reach a terminal state; nothing else would
        // remove them.
        self.clear();
        self.completion.fire();
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Caller-side handle to an exchange returned by
/// [`Client::request`](crate::Client::request).
///
/// Handles are cheap to clone; all clones observe the same exchange.
///
/// # Examples
///
/// ```no_run
/// use http_exchange::{Client, RequestOptions};
///
/// let client = Client::new()?;
/// let handle = client.request("http://example.com/", RequestOptions::new(), |response| {
///     println!("status {}", response.status());
///     Ok(())
/// })?;
///
/// // Re-raises a connection failure or callback error, if one was captured
/// handle.wait()?;
/// client.stop()?;
/// # Ok::<(), http_exchange::ExchangeError>(())
/// ```
#[derive(Clone)]
pub struct ExchangeHandle {
    exchange: Arc<Exchange>,
}

impl ExchangeHandle {
    pub(crate) fn new(exchange: Arc<Exchange>) -> Self {
        ExchangeHandle { exchange }
    }

    /// Identity of the exchange
    pub fn id(&self) -> ExchangeId {
        self.exchange.id()
    }

    /// Target URL
    pub fn url(&self) -> &Url {
        self.exchange.url()
    }

    /// Normalized request method
    pub fn method(&self) -> &Method {
        self.exchange.method()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExchangeState {
        self.exchange.state()
    }

    /// Whether the exchange completed or expired
    pub fn is_terminal(&self) -> bool {
        self.exchange.state().is_terminal()
    }

    /// Whether the transport has finished with the exchange
    pub fn is_finished(&self) -> bool {
        self.exchange.is_finished()
    }

    /// The frozen response, once the exchange is terminal
    pub fn response(&self) -> Option<Response> {
        self.exchange.response()
    }

    /// The captured error, without waiting
    pub fn error(&self) -> Option<ExchangeError> {
        self.exchange.error()
    }

    /// Block until the exchange is finished.
    ///
    /// Returns the first captured asynchronous error (connection failure,
    /// protocol error, or callback failure), if any. Must not be called from
    /// the exchange's own callback.
    pub fn wait(&self) -> Result<()> {
        self.exchange.await_completion()
    }

    /// Block for at most `timeout`; `Ok(false)` means still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.exchange.await_until(Instant::now() + timeout)
    }

    /// Async flavor of [`wait`](Self::wait).
    pub async fn done(&self) -> Result<()> {
        self.exchange.completed().await
    }
}

impl fmt::Debug for ExchangeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.exchange, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn callback<F>(f: F) -> Callback
    where
        F: FnOnce(&Response) -> CallbackResult + Send + 'static,
    {
        Box::new(f)
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> Callback {
        let counter = counter.clone();
        callback(move |_response| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn exchange(url: &str, callback: Callback) -> Arc<Exchange> {
        let exchange =
            Exchange::setup(url, RequestOptions::new(), callback, Weak::new()).unwrap();
        exchange.mark_in_flight();
        Arc::new(exchange)
    }

    #[test]
    fn test_setup_defaults() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exchange = exchange("https://example.test/path", counting_callback(&counter));
        assert_eq!(*exchange.method(), Method::GET);
        assert_eq!(exchange.state(), ExchangeState::InFlight);
        assert!(exchange.outbound().body.is_none());
        assert!(exchange.response().is_none());
    }

    #[test]
    fn test_setup_rejects_bad_urls() {
        for url in ["", "   ", "not a url", "ftp://example.test/", "http://"] {
            let result = Exchange::setup(url, RequestOptions::new(), callback(|_| Ok(())), Weak::new());
            assert!(
                matches!(result, Err(ExchangeError::Configuration(_))),
                "expected configuration error for {:?}",
                url
            );
        }
    }

    #[test]
    fn test_setup_normalizes_method_and_drains_body() {
        let options = RequestOptions::new()
            .with_method("post")
            .with_header("X-First", "1")
            .with_header("X-Second", "2")
            .with_body(io::Cursor::new(b"payload".to_vec()));
        let exchange =
            Exchange::setup("http://example.test/", options, callback(|_| Ok(())), Weak::new())
                .unwrap();

        let outbound = exchange.outbound();
        assert_eq!(outbound.method, Method::POST);
        assert_eq!(outbound.headers[0].0.as_str(), "x-first");
        assert_eq!(outbound.headers[1].0.as_str(), "x-second");
        assert_eq!(outbound.body, Some(Bytes::from_static(b"payload")));
    }

    #[test]
    fn test_setup_unreadable_body() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
            }
        }

        let options = RequestOptions::new().with_body(Broken);
        let result =
            Exchange::setup("http://example.test/", options, callback(|_| Ok(())), Weak::new());
        assert!(matches!(result, Err(ExchangeError::Configuration(_))));
    }

    #[test]
    fn test_complete_runs_callback_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exchange = exchange("http://example.test/ok", counting_callback(&counter));

        exchange.on_response_header("Content-Type", "text/plain");
        exchange.on_response_complete(200, Bytes::from_static(b"OK"));
        exchange.on_response_complete(500, Bytes::new());
        exchange.on_expire();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.state(), ExchangeState::Completed);
        let response = exchange.response().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().as_deref(), Some("OK"));
        assert!(!response.is_timeout());
        assert!(!response.is_ssl());
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert!(exchange.await_completion().is_ok());
    }

    #[test]
    fn test_expire_before_headers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exchange = exchange("https://example.test/slow", counting_callback(&counter));

        exchange.on_expire();
        exchange.on_response_complete(200, Bytes::from_static(b"late"));
        exchange.on_response_header("X-Late", "1");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let response = exchange.response().unwrap();
        assert_eq!(response.status(), -1);
        assert!(response.body().is_none());
        assert!(response.is_timeout());
        assert!(response.is_ssl());
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_empty_body_is_absent() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        exchange.on_response_complete(204, Bytes::new());
        assert!(exchange.response().unwrap().body().is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        let first = ExchangeError::ConnectionFailure("refused".to_string());

        exchange.on_connection_failed(first.clone());
        exchange.on_exception(ExchangeError::Protocol("garbage".to_string()));
        exchange.on_finished();

        assert_eq!(exchange.await_completion(), Err(first));
        assert_eq!(exchange.state(), ExchangeState::InFlight);
    }

    #[test]
    fn test_concurrent_errors_keep_one() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let exchange = exchange.clone();
                thread::spawn(move || {
                    exchange.on_exception(ExchangeError::Protocol(format!("error {}", i)))
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let captured = exchange.error().unwrap();
        exchange.on_exception(ExchangeError::Protocol("after".to_string()));
        assert_eq!(exchange.error(), Some(captured));
    }

    #[test]
    fn test_callback_error_is_captured() {
        let exchange = exchange(
            "http://example.test/",
            callback(|_| Err("callback bug".into())),
        );
        exchange.on_response_complete(200, Bytes::from_static(b"OK"));

        assert_eq!(
            exchange.await_completion(),
            Err(ExchangeError::Callback("callback bug".to_string()))
        );
        assert_eq!(exchange.state(), ExchangeState::Completed);
    }

    #[test]
    fn test_callback_panic_is_captured() {
        let exchange = exchange("http://example.test/", callback(|_| panic!("kaboom")));
        exchange.on_expire();

        assert_eq!(
            exchange.await_completion(),
            Err(ExchangeError::Callback("kaboom".to_string()))
        );
    }

    #[test]
    fn test_callback_error_does_not_replace_transport_error() {
        let exchange = exchange("http://example.test/", callback(|_| Err("late".into())));
        let first = ExchangeError::Protocol("bad header".to_string());
        exchange.on_exception(first.clone());
        exchange.on_response_complete(200, Bytes::new());
        assert_eq!(exchange.await_completion(), Err(first));
    }

    #[test]
    fn test_wait_blocks_until_terminal() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        assert_eq!(
            exchange.await_until(Instant::now() + Duration::from_millis(20)),
            Ok(false)
        );

        let io_thread = {
            let exchange = exchange.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                exchange.on_response_complete(200, Bytes::from_static(b"OK"));
            })
        };

        assert!(exchange.await_completion().is_ok());
        assert!(exchange.is_finished());
        io_thread.join().unwrap();
    }

    #[test]
    fn test_abandon_releases_waiters() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exchange = exchange("http://example.test/", counting_callback(&counter));

        let waiter = {
            let exchange = exchange.clone();
            thread::spawn(move || exchange.await_completion())
        };
        thread::sleep(Duration::from_millis(20));
        exchange.abandon(ExchangeError::Shutdown("client stopped".to_string()));

        assert_eq!(
            waiter.join().unwrap(),
            Err(ExchangeError::Shutdown("client stopped".to_string()))
        );
        assert!(exchange.is_finished());
        assert_eq!(exchange.state(), ExchangeState::InFlight);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abandon_after_finish_is_noop() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        exchange.on_response_complete(200, Bytes::new());
        exchange.abandon(ExchangeError::Shutdown("client stopped".to_string()));
        assert!(exchange.await_completion().is_ok());
    }

    #[test]
    fn test_terminal_removes_from_registry() {
        let registry = Arc::new(Registry::new());
        let exchange = Arc::new(
            Exchange::setup(
                "http://example.test/",
                RequestOptions::new(),
                callback(|_| Ok(())),
                Arc::downgrade(&registry),
            )
            .unwrap(),
        );
        registry.insert(exchange.clone());
        assert_eq!(registry.len(), 1);

        exchange.on_response_complete(200, Bytes::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_done_after_terminal_resolves() {
        let exchange = exchange("http://example.test/", callback(|_| Err("late".into())));
        exchange.on_response_complete(200, Bytes::new());

        let handle = ExchangeHandle::new(exchange);
        assert_eq!(
            tokio_test::block_on(handle.done()),
            Err(ExchangeError::Callback("late".to_string()))
        );
    }

    #[tokio::test]
    async fn test_async_done() {
        let exchange = exchange("http://example.test/", callback(|_| Ok(())));
        let handle = ExchangeHandle::new(exchange.clone());

        let waiter = tokio::spawn(async move { handle.done().await });
        tokio::task::yield_now().await;
        exchange.on_expire();

        assert!(waiter.await.unwrap().is_ok());
    }
}
