//! HTTP exchange client implementation.
//!
//! This module provides the asynchronous request/callback machinery:
//!
//! - **Issue requests** without blocking the caller
//! - **Collect responses** incrementally as transport events arrive
//! - **Deliver results** to a callback exactly once, including timeouts
//! - **Capture errors** off the I/O thread and re-raise them to waiters
//! - **Shut down** synchronously, waiting for outstanding work
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch      - Client and the shared default instance
//! ├── exchange   - per-request state machine and handles
//! ├── registry   - outstanding exchange bookkeeping
//! ├── transport  - Transport trait and the reqwest transport
//! ├── response   - Response value model
//! ├── options    - per-request options
//! ├── config     - client configuration
//! └── utils      - utility functions
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Issues requests and tracks outstanding exchanges |
//! | [`ExchangeHandle`] | Caller-side view of one exchange; blocking and async waits |
//! | [`Response`] | Frozen outcome handed to the callback |
//! | [`RequestOptions`] | Method, headers, body, and deadline for one request |
//! | [`Transport`] | Seam for the I/O engine |
//! | [`ExchangeEvents`] | Events a transport delivers for one exchange |
//! | [`ClientConfig`] | Client configuration options |
//!
//! # Examples
//!
//! ## Creating a Client
//!
//! ```no_run
//! use http_exchange::client::{Client, ClientConfig};
//!
//! // Default configuration
//! let client = Client::new()?;
//!
//! // Custom configuration
//! let config = ClientConfig {
//!     request_timeout_ms: 2_000,
//!     io_threads: 4,
//!     ..Default::default()
//! };
//! let client = Client::with_config(config)?;
//! # Ok::<(), http_exchange::ExchangeError>(())
//! ```
//!
//! ## Waiting for an Exchange
//!
//! ```no_run
//! use http_exchange::{Client, ExchangeError, RequestOptions};
//!
//! let client = Client::new()?;
//! let handle = client.request("http://127.0.0.1:1/", RequestOptions::new(), |_| Ok(()))?;
//!
//! match handle.wait() {
//!     Ok(()) => println!("done: {:?}", handle.response()),
//!     Err(ExchangeError::ConnectionFailure(reason)) => println!("unreachable: {}", reason),
//!     Err(other) => println!("failed: {}", other),
//! }
//! # Ok::<(), http_exchange::ExchangeError>(())
//! ```

mod config;
mod exchange;
mod fetch;
mod options;
mod registry;
mod response;
mod transport;
mod utils;

pub use config::ClientConfig;
pub use exchange::{Callback, CallbackResult, ExchangeEvents, ExchangeHandle, ExchangeId, ExchangeState};
pub use fetch::{default_client, request, stop, Client};
pub use options::RequestOptions;
pub use response::{Response, TIMEOUT_STATUS};
pub use transport::{OutboundRequest, ReqwestTransport, Transport, IO_THREAD_NAME};
pub use utils::{is_success_status, normalize_method};
