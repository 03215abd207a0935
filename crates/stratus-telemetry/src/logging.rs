//! Structured logging for Stratus
//!
//! Provides:
//! - Configurable log levels and env-style filters
//! - JSON, pretty or compact output
//! - Backend context spans

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::{TelemetryError, TelemetryResult};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Emit span open/close events
    pub include_spans: bool,

    /// Include file/line information
    pub include_location: bool,

    /// Include target (module path)
    pub include_target: bool,

    /// Filter directives (e.g., "stratus_backend=debug,redis=warn"); overrides `level`
    pub env_filter: Option<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Machine-readable JSON
    Json,
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// Single line
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_spans: false,
            include_location: true,
            include_target: true,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Build the filter these settings describe
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        let directives = self.env_filter.as_deref().unwrap_or(&self.level);
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::Config(e.to_string()))
    }
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::Logging(e.to_string()))?;

    tracing::info!(
        "Logging initialized with level: {}, format: {:?}",
        config.level,
        config.format
    );

    Ok(())
}

/// Log context for a result backend instance
#[derive(Debug, Clone)]
pub struct BackendLogContext {
    pub backend: String,
    pub endpoint: String,
    pub cluster: bool,
}

impl BackendLogContext {
    /// Context for a single-node backend
    pub fn standard(host: &str, port: u16) -> Self {
        Self {
            backend: "redis".to_string(),
            endpoint: format!("{}:{}", host, port),
            cluster: false,
        }
    }

    /// Context for a cluster backend, named after its first entry point
    pub fn cluster(host: &str, port: u16) -> Self {
        Self {
            backend: "redis-cluster".to_string(),
            endpoint: format!("{}:{}", host, port),
            cluster: true,
        }
    }

    /// Create a tracing span with this context
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "backend",
            backend = %self.backend,
            endpoint = %self.endpoint,
            cluster = self.cluster
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_prefers_directives() {
        let config = LoggingConfig {
            env_filter: Some("stratus_backend=debug".to_string()),
            ..Default::default()
        };
        assert!(config
            .filter()
            .unwrap()
            .to_string()
            .contains("stratus_backend=debug"));
    }

    #[test]
    fn test_bad_filter_is_config_error() {
        let config = LoggingConfig {
            level: "stratus=loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.filter(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn test_disabled_logging_is_noop() {
        let config = LoggingConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(config).is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_backend_context() {
        let ctx = BackendLogContext::cluster("h1", 7000);
        assert_eq!(ctx.backend, "redis-cluster");
        assert_eq!(ctx.endpoint, "h1:7000");
        let _entered = ctx.span().entered();
    }
}
