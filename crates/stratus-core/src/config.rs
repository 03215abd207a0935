//! Application configuration consumed by result backends

use crate::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Application configuration as seen by a result backend
///
/// Mirrors the hosting task queue's settings object: the backend reads its
/// URL, result expiry, serializer and connection defaults from here, and the
/// cluster backend additionally reads `result_backend_transport_options`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Result backend URL
    #[serde(default)]
    pub result_backend: Option<String>,

    /// Default result TTL in seconds
    #[serde(default = "default_result_expires")]
    pub result_expires: u64,

    /// Serializer for stored values
    #[serde(default)]
    pub result_serializer: Serializer,

    /// Maximum connections per client
    #[serde(default)]
    pub redis_max_connections: Option<u32>,

    /// Socket read/write timeout in seconds
    #[serde(default = "default_socket_timeout")]
    pub redis_socket_timeout: Option<f64>,

    /// Socket connect timeout in seconds
    #[serde(default)]
    pub redis_socket_connect_timeout: Option<f64>,

    /// Enable TCP keepalive
    #[serde(default)]
    pub redis_socket_keepalive: Option<bool>,

    /// Retry a command once on timeout
    #[serde(default)]
    pub redis_retry_on_timeout: bool,

    /// Health check interval in seconds
    #[serde(default)]
    pub redis_backend_health_check_interval: Option<u64>,

    /// Client name reported to the server
    #[serde(default)]
    pub redis_client_name: Option<String>,

    /// Extra options passed straight through to the client
    #[serde(default)]
    pub result_backend_transport_options: TransportOptions,
}

fn default_result_expires() -> u64 {
    86400 // 24 hours
}

fn default_socket_timeout() -> Option<f64> {
    Some(120.0)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            result_backend: None,
            result_expires: default_result_expires(),
            result_serializer: Serializer::default(),
            redis_max_connections: None,
            redis_socket_timeout: default_socket_timeout(),
            redis_socket_connect_timeout: None,
            redis_socket_keepalive: None,
            redis_retry_on_timeout: false,
            redis_backend_health_check_interval: None,
            redis_client_name: None,
            result_backend_transport_options: TransportOptions::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::Error::Configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from an optional file, then let environment variables take precedence
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(url) = std::env::var("STRATUS_RESULT_BACKEND") {
            self.result_backend = Some(url);
        }
        if let Ok(expires) = std::env::var("STRATUS_RESULT_EXPIRES") {
            self.result_expires = expires.parse().map_err(|_| {
                crate::Error::Configuration(format!("invalid STRATUS_RESULT_EXPIRES: {}", expires))
            })?;
        }
        if let Ok(max) = std::env::var("STRATUS_REDIS_MAX_CONNECTIONS") {
            self.redis_max_connections = Some(max.parse().map_err(|_| {
                crate::Error::Configuration(format!(
                    "invalid STRATUS_REDIS_MAX_CONNECTIONS: {}",
                    max
                ))
            })?);
        }
        if let Ok(serializer) = std::env::var("STRATUS_RESULT_SERIALIZER") {
            self.result_serializer = serializer.parse()?;
        }
        Ok(())
    }

    /// Copy of the transport options
    ///
    /// Backends adjust the returned map freely; the configuration itself is
    /// never modified.
    pub fn transport_options(&self) -> TransportOptions {
        self.result_backend_transport_options.clone()
    }
}

/// Free-form options forwarded to the storage client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportOptions(Map<String, Value>);

impl TransportOptions {
    /// Create an empty option map
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set an option, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove an option, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over option names and values
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for TransportOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for TransportOptions {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
