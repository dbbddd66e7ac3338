//! Error types for HTTP exchanges.
//!
//! Errors fall into two families:
//!
//! - **Synchronous** errors ([`ExchangeError::Configuration`],
//!   [`ExchangeError::Shutdown`], [`ExchangeError::ClientStopped`]) are returned
//!   directly to the caller of `request` or `stop`.
//! - **Asynchronous** errors ([`ExchangeError::ConnectionFailure`],
//!   [`ExchangeError::Protocol`], [`ExchangeError::Callback`]) are detected on a
//!   transport I/O thread, captured first-write-wins into the exchange, and only
//!   surface when someone waits on that exchange.
//!
//! A timeout is not an error: it is delivered to the callback as a response
//! with `status == -1`.

use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors produced while configuring, running, or shutting down exchanges.
///
/// The type is `Clone` so a single captured error can be handed to every
/// thread that waits on the exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Bad or missing URL, method, header, or unreadable request body
    #[error("Invalid exchange configuration: {0}")]
    Configuration(String),

    /// The transport could not establish or keep the connection
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// The peer sent a malformed response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The user callback returned an error or panicked
    #[error("Callback failed: {0}")]
    Callback(String),

    /// The transport could not be released
    #[error("Shutdown failed: {0}")]
    Shutdown(String),

    /// A request was issued after the client was stopped
    #[error("Client has been stopped")]
    ClientStopped,
}

impl ExchangeError {
    /// Whether this error is captured off the caller's thread and surfaced
    /// only through a blocking wait.
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            ExchangeError::ConnectionFailure(_)
                | ExchangeError::Protocol(_)
                | ExchangeError::Callback(_)
        )
    }
}

impl From<url::ParseError> for ExchangeError {
    fn from(err: url::ParseError) -> Self {
        ExchangeError::Configuration(format!("malformed URL: {}", err))
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Configuration(format!("unreadable request body: {}", err))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            ExchangeError::ConnectionFailure(err.to_string())
        } else if err.is_builder() {
            ExchangeError::Configuration(err.to_string())
        } else {
            ExchangeError::Protocol(err.to_string())
        }
    }
}
