//! Connection parameters handed to Redis clients
//!
//! [`ConnectionParams::from_url`] is the standard derivation shared by both
//! backends. Every adjustment after that returns a new value, so a
//! configuration reused across backend constructions is never aliased.

use crate::traits::{BackendError, BackendResult};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use stratus_core::{AppConfig, TransportOptions};
use url::Url;

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;

const DEFAULT_HOST: &str = "localhost";

/// TLS certificate verification mode for `rediss` connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SslCertReqs {
    #[serde(rename = "required", alias = "CERT_REQUIRED")]
    Required,
    #[serde(rename = "optional", alias = "CERT_OPTIONAL")]
    Optional,
    /// Skip certificate verification
    #[serde(rename = "none", alias = "CERT_NONE")]
    Disabled,
}

impl std::str::FromStr for SslCertReqs {
    type Err = BackendError;

    fn from_str(s: &str) -> BackendResult<Self> {
        match s {
            "required" | "CERT_REQUIRED" => Ok(SslCertReqs::Required),
            "optional" | "CERT_OPTIONAL" => Ok(SslCertReqs::Optional),
            "none" | "CERT_NONE" => Ok(SslCertReqs::Disabled),
            other => Err(BackendError::Configuration(format!(
                "invalid ssl_cert_reqs: {} (expected required, optional or none)",
                other
            ))),
        }
    }
}

/// One cluster entry point.
///
/// Descriptors may carry extra keys (e.g. `server_type`); only `host` and
/// `port` are read. The port may be a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterNode {
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port: {:?}", text))),
    }
}

impl ClusterNode {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `{host, port}` descriptor from transport options
    pub fn from_descriptor(descriptor: &Value) -> BackendResult<Self> {
        serde_json::from_value(descriptor.clone()).map_err(|e| {
            BackendError::Configuration(format!(
                "invalid startup node {}: {}",
                descriptor, e
            ))
        })
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse the `startup_nodes` transport option
///
/// `null` means not configured. Anything other than a list of descriptors is
/// a configuration error.
pub fn parse_startup_nodes(value: &Value) -> BackendResult<Option<Vec<ClusterNode>>> {
    match value {
        Value::Null => Ok(None),
        Value::Array(descriptors) => descriptors
            .iter()
            .map(ClusterNode::from_descriptor)
            .collect::<BackendResult<Vec<_>>>()
            .map(Some),
        other => Err(BackendError::Configuration(format!(
            "startup_nodes must be a list of {{host, port}} mappings, got {}",
            other
        ))),
    }
}

/// Parameters for constructing a Redis client
///
/// Typed fields cover the options the backends understand; anything else
/// supplied through transport options is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,

    pub port: u16,

    /// Logical database index (single-node only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Connect over TLS (`rediss`)
    #[serde(default)]
    pub tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert_reqs: Option<SslCertReqs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_timeout: Option<f64>,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_connect_timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_keepalive: Option<bool>,

    #[serde(default)]
    pub retry_on_timeout: bool,

    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Route read-only commands to replicas (cluster only)
    #[serde(default)]
    pub read_from_replicas: bool,

    /// Retries on MOVED/ASK/TRYAGAIN before giving up (cluster only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_error_retry_attempts: Option<u32>,

    /// Cluster entry points (cluster only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_nodes: Option<Vec<ClusterNode>>,

    /// Options no typed field claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionParams {
    /// Derive parameters from a `redis://` or `rediss://` URL
    ///
    /// Connection defaults come from `app`; query parameters override them.
    pub fn from_url(url: &str, app: &AppConfig) -> BackendResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| BackendError::Configuration(format!("invalid backend url: {}", e)))?;

        let tls = match parsed.scheme() {
            "redis" => false,
            "rediss" => true,
            other => {
                return Err(BackendError::Configuration(format!(
                    "unsupported url scheme: {} (expected redis or rediss)",
                    other
                )))
            }
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();

        let db = match parsed.path().trim_start_matches('/') {
            "" => 0,
            segment => parse_db(segment)?,
        };

        let username = match parsed.username() {
            "" => None,
            name => Some(decode(name)?),
        };
        let password = parsed.password().map(decode).transpose()?;

        let params = Self {
            host,
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            db: Some(db),
            username,
            password,
            tls,
            ssl_cert_reqs: None,
            max_connections: app.redis_max_connections,
            socket_timeout: app.redis_socket_timeout,
            socket_connect_timeout: app.redis_socket_connect_timeout,
            socket_keepalive: app.redis_socket_keepalive,
            retry_on_timeout: app.redis_retry_on_timeout,
            health_check_interval: app.redis_backend_health_check_interval,
            client_name: app.redis_client_name.clone(),
            read_from_replicas: false,
            cluster_error_retry_attempts: None,
            startup_nodes: None,
            extra: Map::new(),
        };

        let query: TransportOptions = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), query_value(&v)))
            .collect();
        if query.is_empty() {
            Ok(params)
        } else {
            params.merge(&query)
        }
    }

    /// Overlay options onto these parameters
    ///
    /// Each option replaces the same-named parameter and is type-checked
    /// against it; unknown names are kept in `extra`.
    pub fn merge(&self, options: &TransportOptions) -> BackendResult<Self> {
        let mut map = self.to_map()?;
        for (key, value) in options.iter() {
            map.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(map))
            .map_err(|e| BackendError::Configuration(format!("invalid connection option: {}", e)))
    }

    /// Parameters as a name-to-value mapping; unset options have no entry
    pub fn to_map(&self) -> BackendResult<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(BackendError::Internal(format!(
                "connection parameters serialized to {}",
                other
            ))),
            Err(e) => Err(BackendError::Internal(e.to_string())),
        }
    }

    /// `redis` or `rediss`
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "rediss"
        } else {
            "redis"
        }
    }

    /// Whether TLS certificates should go unverified
    pub fn tls_insecure(&self) -> bool {
        self.tls && self.ssl_cert_reqs == Some(SslCertReqs::Disabled)
    }

    /// Client URL for a node, carrying the credentials and database
    pub fn node_url(&self, host: &str, port: u16) -> BackendResult<String> {
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme(), host, port))
            .map_err(|e| BackendError::Configuration(format!("invalid node address: {}", e)))?;

        let credentials_rejected = || {
            BackendError::Configuration(format!("cannot attach credentials to {}:{}", host, port))
        };
        if let Some(username) = &self.username {
            url.set_username(username).map_err(|_| credentials_rejected())?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| credentials_rejected())?;
        }
        if let Some(db) = self.db {
            url.set_path(&format!("/{}", db));
        }
        if self.tls_insecure() {
            url.set_fragment(Some("insecure"));
        }
        Ok(url.into())
    }

    /// Client URL for the configured host
    pub fn to_url(&self) -> BackendResult<String> {
        self.node_url(&self.host, self.port)
    }

    pub fn socket_timeout(&self) -> BackendResult<Option<Duration>> {
        self.socket_timeout
            .map(|secs| seconds("socket_timeout", secs))
            .transpose()
    }

    pub fn socket_connect_timeout(&self) -> BackendResult<Option<Duration>> {
        self.socket_connect_timeout
            .map(|secs| seconds("socket_connect_timeout", secs))
            .transpose()
    }
}

fn parse_db(segment: &str) -> BackendResult<i64> {
    segment
        .parse()
        .map_err(|_| BackendError::Configuration(format!("invalid database index: {}", segment)))
}

fn decode(component: &str) -> BackendResult<String> {
    urlencoding::decode(component)
        .map(|s| s.into_owned())
        .map_err(|e| BackendError::Configuration(format!("invalid url credentials: {}", e)))
}

/// Query strings are untyped; give numbers and booleans their natural type.
fn query_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(n) = raw.parse::<i64>() {
        Value::from(n)
    } else if let Ok(f) = raw.parse::<f64>() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string()))
    } else {
        Value::String(raw.to_string())
    }
}

fn seconds(name: &str, secs: f64) -> BackendResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| BackendError::Configuration(format!("invalid {}: {} ({})", name, secs, e)))
}
