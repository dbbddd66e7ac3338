//! Logging setup.
//!
//! The crate itself only emits `tracing` events. Applications that do not
//! install their own subscriber can call [`init_logging`] to get one:
//!
//! | Option | Threshold |
//! |--------|-----------|
//! | default | `ERROR` |
//! | `warn` | `WARN` |
//! | `debug` | `DEBUG` (wins over `warn`) |
//!
//! Console output is the bare message. File output is appended and prefixed
//! with a timestamp and level.

use crate::error::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;

/// Options controlling [`init_logging`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Log at DEBUG
    pub debug: bool,
    /// Log at WARN
    pub warn: bool,
    /// Append to this file instead of writing to the console
    pub log_file: Option<PathBuf>,
    /// The host application configures logging itself; install nothing
    pub external: bool,
}

impl LogOptions {
    /// Threshold implied by the options
    pub fn level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::DEBUG
        } else if self.warn {
            LevelFilter::WARN
        } else {
            LevelFilter::ERROR
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// Returns `Ok(false)` when `external` is set and nothing was installed.
///
/// # Errors
///
/// [`ExchangeError::Configuration`] if the log file cannot be opened or a
/// global subscriber is already installed.
pub fn init_logging(options: &LogOptions) -> Result<bool> {
    if options.external {
        return Ok(false);
    }

    let builder = tracing_subscriber::fmt().with_max_level(options.level());

    let installed = match &options.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ExchangeError::Configuration(format!(
                        "cannot open log file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            builder
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder
            .without_time()
            .with_level(false)
            .with_target(false)
            .try_init(),
    };

    installed
        .map(|()| true)
        .map_err(|e| ExchangeError::Configuration(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(LogOptions::default().level(), LevelFilter::ERROR);

        let warn = LogOptions {
            warn: true,
            ..Default::default()
        };
        assert_eq!(warn.level(), LevelFilter::WARN);

        let debug = LogOptions {
            debug: true,
            warn: true,
            ..Default::default()
        };
        assert_eq!(debug.level(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_external_installs_nothing() {
        let options = LogOptions {
            external: true,
            ..Default::default()
        };
        assert_eq!(init_logging(&options), Ok(false));
    }

    #[test]
    fn test_unopenable_log_file() {
        let options = LogOptions {
            log_file: Some(PathBuf::from("/nonexistent-dir/for/sure/exchange.log")),
            ..Default::default()
        };
        assert!(matches!(
            init_logging(&options),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[test]
    fn test_options_from_json() {
        let options: LogOptions = serde_json::from_str(r#"{"warn": true}"#).unwrap();
        assert!(options.warn);
        assert!(options.log_file.is_none());
    }
}
