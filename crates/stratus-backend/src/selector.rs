//! Backend selection from the configured URL
//!
//! The task queue registers [`choose_redis_backend`] and
//! [`choose_rediss_backend`] for the `redis` and `rediss` aliases. Each looks
//! at the URL it is handed: one starting with `cluster` gets a
//! [`RedisClusterBackend`] after the prefix is swapped for the real scheme,
//! anything else gets the plain [`RedisBackend`] with its options untouched.

use crate::cluster::RedisClusterBackend;
use crate::errors::ConnectionErrors;
use crate::redis::{RedisBackend, DEFAULT_URL};
use crate::traits::{Backend, BackendError, BackendResult, BackendStats};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{AppConfig, TaskId, TaskMeta, TaskResult, TaskState};
use tracing::debug;

/// URL prefix that selects cluster mode
pub const CLUSTER_PREFIX: &str = "cluster";

/// Plain URL scheme a cluster URL is rewritten to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plaintext
    Redis,
    /// TLS
    Rediss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Redis => "redis",
            Scheme::Rediss => "rediss",
        }
    }

    /// Scheme implied by a URL; cluster URLs are plaintext unless chosen
    /// through [`choose_rediss_backend`]
    pub fn for_url(url: &str) -> Self {
        if url.starts_with("rediss:") {
            Scheme::Rediss
        } else {
            Scheme::Redis
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = BackendError;

    fn from_str(s: &str) -> BackendResult<Self> {
        match s {
            "redis" => Ok(Scheme::Redis),
            "rediss" => Ok(Scheme::Rediss),
            other => Err(BackendError::Configuration(format!(
                "unknown scheme: {}",
                other
            ))),
        }
    }
}

/// Arguments the task queue hands to a backend constructor
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// Connection URL
    pub url: Option<String>,

    /// Application configuration
    pub app: Option<Arc<AppConfig>>,
}

impl BackendOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            app: None,
        }
    }

    pub fn with_app(mut self, app: impl Into<Arc<AppConfig>>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// The supplied app, or default settings when none was given
    pub fn app_config(&self) -> Arc<AppConfig> {
        self.app.clone().unwrap_or_default()
    }

    /// Explicit URL, else the app's `result_backend`, else the local default
    pub fn resolve_url(&self, app: &AppConfig) -> String {
        self.url
            .clone()
            .or_else(|| app.result_backend.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string())
    }
}

/// Pick and build the backend for `options.url`
///
/// Construction errors come from the chosen backend; nothing is validated here.
pub fn choose_backend(scheme: Scheme, options: BackendOptions) -> BackendResult<AnyBackend> {
    match options.url.as_deref() {
        Some(url) if url.starts_with(CLUSTER_PREFIX) => {
            let url = url.replacen(CLUSTER_PREFIX, scheme.as_str(), 1);
            debug!("Cluster URL detected, selecting Redis Cluster backend ({})", scheme);
            let options = BackendOptions {
                url: Some(url),
                ..options
            };
            Ok(AnyBackend::Cluster(RedisClusterBackend::new(options)?))
        }
        _ => Ok(AnyBackend::Standard(RedisBackend::new(options)?)),
    }
}

/// Entry point for the `redis` alias
pub fn choose_redis_backend(options: BackendOptions) -> BackendResult<AnyBackend> {
    choose_backend(Scheme::Redis, options)
}

/// Entry point for the `rediss` alias
pub fn choose_rediss_backend(options: BackendOptions) -> BackendResult<AnyBackend> {
    choose_backend(Scheme::Rediss, options)
}

/// Whichever backend the selector built
#[derive(Debug, Clone)]
pub enum AnyBackend {
    Standard(RedisBackend),
    Cluster(RedisClusterBackend),
}

impl AnyBackend {
    pub fn is_cluster(&self) -> bool {
        matches!(self, AnyBackend::Cluster(_))
    }

    /// URL the chosen backend was built with
    pub fn url(&self) -> &str {
        match self {
            AnyBackend::Standard(b) => b.url(),
            AnyBackend::Cluster(b) => b.url(),
        }
    }

    pub fn as_cluster(&self) -> Option<&RedisClusterBackend> {
        match self {
            AnyBackend::Cluster(b) => Some(b),
            AnyBackend::Standard(_) => None,
        }
    }

    pub async fn ping(&self) -> BackendResult<()> {
        match self {
            AnyBackend::Standard(b) => b.ping().await,
            AnyBackend::Cluster(b) => b.ping().await,
        }
    }
}

macro_rules! delegate {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            AnyBackend::Standard($backend) => $call,
            AnyBackend::Cluster($backend) => $call,
        }
    };
}

#[async_trait]
impl Backend for AnyBackend {
    async fn connect(url: &str) -> BackendResult<Self> {
        let backend = choose_backend(Scheme::for_url(url), BackendOptions::new(url))?;
        backend.ping().await?;
        Ok(backend)
    }

    fn connection_errors(&self) -> &ConnectionErrors {
        delegate!(self, b => b.connection_errors())
    }

    async fn is_connected(&self) -> bool {
        delegate!(self, b => b.is_connected().await)
    }

    async fn close(&self) -> BackendResult<()> {
        delegate!(self, b => b.close().await)
    }

    async fn store_result(&self, result: &TaskResult, ttl: Option<Duration>) -> BackendResult<()> {
        delegate!(self, b => b.store_result(result, ttl).await)
    }

    async fn get_result(&self, task_id: &TaskId) -> BackendResult<Option<TaskResult>> {
        delegate!(self, b => b.get_result(task_id).await)
    }

    async fn delete_result(&self, task_id: &TaskId) -> BackendResult<bool> {
        delegate!(self, b => b.delete_result(task_id).await)
    }

    async fn store_meta(&self, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()> {
        delegate!(self, b => b.store_meta(task_id, meta).await)
    }

    async fn get_meta(&self, task_id: &TaskId) -> BackendResult<Option<TaskMeta>> {
        delegate!(self, b => b.get_meta(task_id).await)
    }

    async fn update_state(&self, task_id: &TaskId, state: TaskState) -> BackendResult<()> {
        delegate!(self, b => b.update_state(task_id, state).await)
    }

    async fn get_state(&self, task_id: &TaskId) -> BackendResult<Option<TaskState>> {
        delegate!(self, b => b.get_state(task_id).await)
    }

    async fn stats(&self) -> BackendResult<BackendStats> {
        delegate!(self, b => b.stats().await)
    }

    async fn store_raw(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
        delegate!(self, b => b.store_raw(key, data, ttl).await)
    }

    async fn get_raw(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        delegate!(self, b => b.get_raw(key).await)
    }

    async fn delete_raw(&self, key: &str) -> BackendResult<bool> {
        delegate!(self, b => b.delete_raw(key).await)
    }
}
