//! Main exchange client implementation.
//!
//! Provides [`Client`], which issues non-blocking requests, tracks every
//! in-flight exchange until its terminal transition, and shuts down
//! synchronously.
//!
//! # Examples
//!
//! ## Callback delivery
//!
//! ```no_run
//! use http_exchange::{Client, RequestOptions};
//!
//! let client = Client::new()?;
//! client.request("http://example.com/", RequestOptions::new(), |response| {
//!     if response.is_timeout() {
//!         println!("timed out");
//!     } else {
//!         println!("{} ({} bytes)", response.status(), response.body().map_or(0, |b| b.len()));
//!     }
//!     Ok(())
//! })?;
//!
//! // Waits for outstanding exchanges, then releases the transport
//! client.stop()?;
//! # Ok::<(), http_exchange::ExchangeError>(())
//! ```
//!
//! ## Shared default client
//!
//! ```no_run
//! use http_exchange::RequestOptions;
//!
//! http_exchange::request("http://example.com/", RequestOptions::new(), |response| {
//!     println!("status {}", response.status());
//!     Ok(())
//! })?;
//! http_exchange::stop()?;
//! # Ok::<(), http_exchange::ExchangeError>(())
//! ```

use crate::client::config::ClientConfig;
use crate::client::exchange::{CallbackResult, Exchange, ExchangeHandle, ExchangeId};
use crate::client::options::RequestOptions;
use crate::client::registry::Registry;
use crate::client::response::Response;
use crate::client::transport::{ReqwestTransport, Transport};
use crate::error::{ExchangeError, Result};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Registry of in-flight exchanges over a shared transport.
///
/// Cloning a `Client` yields another handle to the same registry and
/// transport; stopping any clone stops them all.
///
/// # Thread Safety
///
/// `request` may be called from any number of threads at once. Callbacks run on
/// transport I/O threads, never on the thread that issued the request.
#[derive(Clone)]
pub struct Client {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
}

impl Client {
    /// Create a client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client backed by a [`ReqwestTransport`]
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Client {
            registry: Arc::new(Registry::new()),
            transport,
            config: Arc::new(config),
        }
    }

    /// Issue a request; returns as soon as the transport has accepted it.
    ///
    /// The callback is invoked exactly once, with either the completed response
    /// or a timeout response (`status == -1`). Connection failures do not run
    /// the callback; they surface through [`ExchangeHandle::wait`].
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::Configuration`] for a missing or malformed URL, an
    ///   invalid method or header, or an unreadable body
    /// - [`ExchangeError::ClientStopped`] after [`stop`](Self::stop)
    pub fn request<F>(&self, url: &str, options: RequestOptions, callback: F) -> Result<ExchangeHandle>
    where
        F: FnOnce(&Response) -> CallbackResult + Send + 'static,
    {
        if self.is_stopped() {
            return Err(ExchangeError::ClientStopped);
        }

        let deadline = options.timeout.unwrap_or_else(|| self.config.request_timeout());
        let exchange = Arc::new(Exchange::setup(
            url,
            options,
            Box::new(callback),
            Arc::downgrade(&self.registry),
        )?);

        // Refused once stop() has closed the registry, even if the check above
        // passed.
        if !self.registry.insert(exchange.clone()) {
            return Err(ExchangeError::ClientStopped);
        }
        exchange.mark_in_flight();

        if let Err(error) = self
            .transport
            .submit(exchange.outbound(), deadline, exchange.clone())
        {
            self.registry.remove(&exchange.id());
            return Err(error);
        }

        tracing::debug!(
            exchange = %exchange.id(),
            method = %exchange.method(),
            url = %exchange.url(),
            ?deadline,
            "exchange submitted"
        );
        Ok(ExchangeHandle::new(exchange))
    }

    /// Forget an exchange. Removing an identity that is not tracked is a no-op.
    pub fn clear(&self, id: &ExchangeId) {
        if self.registry.remove(id).is_some() {
            tracing::trace!(exchange = %id, "exchange cleared");
        }
    }

    /// Whether `id` is still outstanding
    pub fn is_outstanding(&self, id: &ExchangeId) -> bool {
        self.registry.contains(id)
    }

    /// Number of outstanding exchanges
    pub fn outstanding(&self) -> usize {
        self.registry.len()
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.registry.is_closed()
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop the client.
    ///
    /// New requests are refused from this point on. Outstanding exchanges get
    /// up to `shutdown_grace_ms` to finish, the registry is drained, and the
    /// transport is released. Safe to call with nothing outstanding and safe to
    /// call more than once.
    ///
    /// Exchanges still running after the grace period are not cancelled, but
    /// their waiters are released with [`ExchangeError::Shutdown`].
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Shutdown`] when the transport cannot be released, for
    /// instance when called from inside one of this client's callbacks.
    pub fn stop(&self) -> Result<()> {
        if self.transport.on_io_thread() {
            return Err(ExchangeError::Shutdown(
                "stop() called from this client's transport I/O thread".to_string(),
            ));
        }

        self.registry.close();

        let deadline = Instant::now() + self.config.shutdown_grace();
        for exchange in self.registry.snapshot() {
            // Captured errors belong to whoever waits on the handle.
            if let Ok(false) = exchange.await_until(deadline) {
                tracing::warn!(exchange = %exchange.id(), url = %exchange.url(), "exchange still running at shutdown");
            }
        }

        let abandoned = self.registry.drain();
        if !abandoned.is_empty() {
            tracing::warn!(count = abandoned.len(), "abandoning outstanding exchanges");
        }

        let released = self.transport.shutdown();
        for exchange in abandoned {
            exchange.abandon(ExchangeError::Shutdown(
                "client stopped before the exchange finished".to_string(),
            ));
        }
        released
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("outstanding", &self.outstanding())
            .field("stopped", &self.is_stopped())
            .field("config", &self.config)
            .finish()
    }
}

static DEFAULT_CLIENT: Lazy<Result<Client>> = Lazy::new(Client::new);

/// The process-wide client used by [`request`] and [`stop`].
///
/// Built on first use and never rebuilt: after [`stop`], it refuses requests.
pub fn default_client() -> Result<&'static Client> {
    match &*DEFAULT_CLIENT {
        Ok(client) => Ok(client),
        Err(error) => Err(error.clone()),
    }
}

/// Issue a request on the shared default client.
pub fn request<F>(url: &str, options: RequestOptions, callback: F) -> Result<ExchangeHandle>
where
    F: FnOnce(&Response) -> CallbackResult + Send + 'static,
{
    default_client()?.request(url, options, callback)
}

/// Stop the shared default client. A no-op if it was never used.
pub fn stop() -> Result<()> {
    match Lazy::get(&DEFAULT_CLIENT) {
        Some(Ok(client)) => client.stop(),
        _ => Ok(()),
    }
}
