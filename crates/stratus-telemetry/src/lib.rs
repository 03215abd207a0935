//! Stratus Telemetry - Structured logging
//!
//! Backends log through `tracing`; this crate installs the subscriber and
//! provides span helpers carrying backend context.

pub mod logging;

pub use logging::{init_logging, BackendLogContext, LogFormat, LoggingConfig};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
