//! Utility functions for the exchange client.
//!
//! This module provides helper functions for:
//! - Status code classification
//! - Method and header validation during setup
//! - Turning callback panics into error messages

use crate::error::{ExchangeError, Result};
use http::{HeaderName, HeaderValue, Method};
use std::any::Any;

/// Check if a status indicates success.
///
/// "Success" means the status is in `[200, 400)`: neither a client nor a
/// server error. The timeout sentinel `-1` is never a success.
///
/// # Examples
///
/// ```
/// use http_exchange::client::is_success_status;
///
/// assert!(is_success_status(200));
/// assert!(is_success_status(304));
/// assert!(!is_success_status(404));
/// assert!(!is_success_status(-1));
/// ```
pub fn is_success_status(status: i32) -> bool {
    (200..400).contains(&status)
}

/// Upper-case and validate an HTTP method.
///
/// # Examples
///
/// ```
/// use http_exchange::client::normalize_method;
///
/// assert_eq!(normalize_method("post").unwrap(), http::Method::POST);
/// assert!(normalize_method("").is_err());
/// ```
pub fn normalize_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(ExchangeError::Configuration("empty HTTP method".to_string()));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| ExchangeError::Configuration(format!("invalid HTTP method: {}", method)))
}

/// Validate a request header pair.
pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ExchangeError::Configuration(format!("invalid header name: {}", name)))?;
    let header_value = HeaderValue::from_str(value).map_err(|_| {
        ExchangeError::Configuration(format!("invalid value for header {}", name))
    })?;
    Ok((header_name, header_value))
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success_status() {
        assert!(is_success_status(200));
        assert!(is_success_status(399));
        assert!(!is_success_status(199));
        assert!(!is_success_status(400));
        assert!(!is_success_status(503));
    }

    #[test]
    fn test_normalize_method() {
        assert_eq!(normalize_method("get").unwrap(), Method::GET);
        assert_eq!(normalize_method(" Delete ").unwrap(), Method::DELETE);
        assert_eq!(normalize_method("purge").unwrap().as_str(), "PURGE");
        assert!(normalize_method("bad method").is_err());
    }

    #[test]
    fn test_parse_header() {
        assert!(parse_header("X-Trace", "abc").is_ok());
        assert!(parse_header("bad header", "abc").is_err());
        assert!(parse_header("X-Trace", "line\nbreak").is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "callback panicked");
    }
}
