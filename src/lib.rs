#![warn(missing_docs)]

//! # http_exchange: callback-driven HTTP client exchanges
//!
//! This crate issues outbound HTTP requests against a shared client, collects
//! each response incrementally as it arrives off a transport I/O thread, and
//! hands the finished result to a caller-supplied callback.
//!
//! ## Overview
//!
//! - **Response** - a value built up by transport events and frozen by exactly
//!   one terminal transition (completion or expiry)
//! - **Exchange** - per-request state machine: `Configured → InFlight →
//!   {Completed | Expired}`, with a first-write-wins error slot on the side
//! - **Client** - registry of in-flight exchanges with non-blocking `request`
//!   and a synchronous `stop`
//! - **Transport** - the I/O engine; [`ReqwestTransport`] runs a dedicated
//!   tokio runtime over `reqwest`
//!
//! ## Guarantees
//!
//! - The callback runs exactly once per exchange, on a transport thread
//! - A timeout is a response, not an error: `status == -1`, no body,
//!   `is_timeout() == true`
//! - Connection failures, protocol errors, and callback failures (errors or
//!   panics) are captured, first one wins, and re-raised only to a thread that
//!   waits on the exchange; they never unwind through the transport
//!
//! ## Usage
//!
//! ```no_run
//! use http_exchange::{Client, RequestOptions};
//! use std::time::Duration;
//!
//! let client = Client::new()?;
//!
//! let options = RequestOptions::new()
//!     .with_method("post")
//!     .with_header("Content-Type", "text/plain")
//!     .with_body(&b"hello"[..])
//!     .with_timeout(Duration::from_secs(5));
//!
//! let handle = client.request("https://example.com/echo", options, |response| {
//!     assert!(response.is_ssl());
//!     println!("{} {:?}", response.status(), response.text());
//!     Ok(())
//! })?;
//!
//! handle.wait()?;
//! client.stop()?;
//! # Ok::<(), http_exchange::ExchangeError>(())
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - client, exchanges, responses, and transports
//! - **[error]** - error types and result handling
//! - **[logging]** - optional `tracing` subscriber setup

pub mod client;
pub mod error;
pub mod logging;

pub use client::{
    default_client, request, stop, Client, ClientConfig, ExchangeEvents, ExchangeHandle,
    ExchangeId, ExchangeState, ReqwestTransport, RequestOptions, Response, Transport,
};
pub use error::{ExchangeError, Result};
pub use logging::{init_logging, LogOptions};
