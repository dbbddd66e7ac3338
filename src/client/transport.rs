//! Transport seam and the reqwest-backed production transport.
//!
//! A [`Transport`] performs the actual I/O for an exchange and reports back
//! through the [`ExchangeEvents`] interface on threads of its own choosing.
//! The exchange never inherits from or reaches into the transport; the client
//! registers the exchange as an event sink at submission time.
//!
//! [`ReqwestTransport`] owns a multi-thread tokio runtime (the I/O pool) and a
//! shared `reqwest::Client`. Each submission becomes one task:
//!
//! 1. send the request under the exchange deadline
//! 2. deliver every response header
//! 3. accumulate the body chunk by chunk
//! 4. deliver `on_response_complete`, or `on_expire` if the deadline elapsed
//! 5. deliver `on_finished`
//!
//! Step 5 happens even when the task is dropped before it runs to the end,
//! for instance when [`Transport::shutdown`] tears the runtime down under a
//! slow exchange. Such an exchange reports [`ExchangeError::Shutdown`] first.

use crate::client::config::ClientConfig;
use crate::client::exchange::ExchangeEvents;
use crate::error::{ExchangeError, Result};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{HeaderName, HeaderValue, Method};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use url::Url;

/// Prefix of every transport I/O thread name. Each transport appends its own
/// sequence number, so threads of different transports are told apart.
pub const IO_THREAD_NAME: &str = "http-exchange-io";

static TRANSPORT_SEQ: AtomicUsize = AtomicUsize::new(0);

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully configured request, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Target URL
    pub url: Url,
    /// Upper-cased method
    pub method: Method,
    /// Headers in application order
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Request body, already drained from its source
    pub body: Option<Bytes>,
}

/// The I/O engine behind a [`Client`](crate::Client).
pub trait Transport: Send + Sync {
    /// Start an exchange; must not block.
    ///
    /// Events for the exchange are delivered to `events` later, on transport
    /// threads. `deadline` bounds the whole exchange. Once accepted, the
    /// exchange must get `on_finished` even if the transport is released
    /// first.
    fn submit(
        &self,
        request: OutboundRequest,
        deadline: Duration,
        events: Arc<dyn ExchangeEvents>,
    ) -> Result<()>;

    /// Release the transport's resources.
    fn shutdown(&self) -> Result<()>;

    /// Whether the calling thread is one of the transport's own I/O threads
    fn on_io_thread(&self) -> bool {
        false
    }
}

/// Production transport built on `reqwest` and a dedicated tokio runtime.
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Mutex<Option<Runtime>>,
    thread_name: String,
}

impl ReqwestTransport {
    /// Start the I/O pool and build the shared HTTP client.
    ///
    /// The client-level timeout is the configured default deadline; each
    /// submission may narrow or widen it.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let thread_name = format!(
            "{}-{}",
            IO_THREAD_NAME,
            TRANSPORT_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name(thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| {
                ExchangeError::Configuration(format!("failed to start transport threads: {}", e))
            })?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .user_agent(config.user_agent.clone());

        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url).map_err(|e| {
                ExchangeError::Configuration(format!("invalid proxy {}: {}", config.proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(ReqwestTransport {
            client,
            runtime: Mutex::new(Some(runtime)),
            thread_name,
        })
    }
}

impl Transport for ReqwestTransport {
    fn submit(
        &self,
        request: OutboundRequest,
        deadline: Duration,
        events: Arc<dyn ExchangeEvents>,
    ) -> Result<()> {
        let runtime = self.runtime.lock();
        let runtime = runtime.as_ref().ok_or(ExchangeError::ClientStopped)?;
        let guard = FinishGuard::new(events);
        runtime.spawn(drive(self.client.clone(), request, deadline, guard));
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if self.on_io_thread() {
            return Err(ExchangeError::Shutdown(
                "cannot release the transport from one of its own I/O threads".to_string(),
            ));
        }

        let Some(runtime) = self.runtime.lock().take() else {
            return Ok(());
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            // Blocking is not allowed inside another runtime.
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        }
        tracing::debug!("transport released");
        Ok(())
    }

    fn on_io_thread(&self) -> bool {
        std::thread::current().name() == Some(self.thread_name.as_str())
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("threads", &self.thread_name)
            .field("running", &self.runtime.lock().is_some())
            .finish()
    }
}

/// Delivers `on_finished` when dropped, however the exchange task ends.
///
/// It is moved into the task future at spawn time, so a task dropped before
/// its first poll still reports.
struct FinishGuard {
    events: Arc<dyn ExchangeEvents>,
    delivered: bool,
}

impl FinishGuard {
    fn new(events: Arc<dyn ExchangeEvents>) -> Self {
        FinishGuard {
            events,
            delivered: false,
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if !self.delivered {
            self.events.on_exception(ExchangeError::Shutdown(
                "transport released before the exchange finished".to_string(),
            ));
        }
        self.events.on_finished();
    }
}

/// Run one exchange to its end and report every event.
async fn drive(
    client: reqwest::Client,
    request: OutboundRequest,
    deadline: Duration,
    mut guard: FinishGuard,
) {
    let events = guard.events.clone();
    match tokio::time::timeout(deadline, exchange(&client, request, deadline, events.as_ref())).await
    {
        Ok(Ok(())) => {}
        Ok(Err(error)) => deliver_error(events.as_ref(), error),
        Err(_) => events.on_expire(),
    }
    guard.delivered = true;
}

async fn exchange(
    client: &reqwest::Client,
    request: OutboundRequest,
    deadline: Duration,
    events: &dyn ExchangeEvents,
) -> std::result::Result<(), reqwest::Error> {
    let mut builder = client
        .request(request.method, request.url)
        .timeout(deadline);
    for (name, value) in request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    for (name, value) in response.headers() {
        events.on_response_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }

    let mut body = BytesMut::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }

    events.on_response_complete(status, body.freeze());
    Ok(())
}

fn deliver_error(events: &dyn ExchangeEvents, error: reqwest::Error) {
    if error.is_timeout() {
        events.on_expire();
    } else if error.is_connect() {
        events.on_connection_failed(ExchangeError::ConnectionFailure(error.to_string()));
    } else {
        events.on_exception(ExchangeError::Protocol(error.to_string()));
    }
}
