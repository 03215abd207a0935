//! Single-node Redis result backend

use crate::errors::ConnectionErrors;
use crate::keyspace::Keyspace;
use crate::params::ConnectionParams;
use crate::selector::BackendOptions;
use crate::traits::{Backend, BackendError, BackendResult, BackendStats};
use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolError, Runtime};
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{AppConfig, TaskId, TaskMeta, TaskResult, TaskState};
use tracing::info;

/// URL used when neither the options nor the app name one
pub const DEFAULT_URL: &str = "redis://localhost:6379/0";

/// Redis backend over a connection pool
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
    url: Arc<str>,
    params: Arc<ConnectionParams>,
    keyspace: Arc<Keyspace>,
}

impl RedisBackend {
    /// Build the backend without touching the network
    pub fn new(options: BackendOptions) -> BackendResult<Self> {
        let app = options.app_config();
        let url = options.resolve_url(&app);
        let params = ConnectionParams::from_url(&url, &app)?;
        Self::from_params(url, params, &app)
    }

    /// Build over already-derived parameters
    pub fn from_params(
        url: impl Into<Arc<str>>,
        params: ConnectionParams,
        app: &AppConfig,
    ) -> BackendResult<Self> {
        let mut builder = Config::from_url(params.to_url()?)
            .builder()
            .map_err(|e| BackendError::Configuration(e.to_string()))?
            .runtime(Runtime::Tokio1);

        match params.max_connections {
            Some(0) => {
                return Err(BackendError::Configuration(
                    "max_connections must be at least 1".to_string(),
                ))
            }
            Some(max) => builder = builder.max_size(max as usize),
            None => {}
        }
        if let Some(timeout) = params.socket_connect_timeout()? {
            builder = builder.create_timeout(Some(timeout));
        }

        let pool = builder
            .build()
            .map_err(|e| BackendError::Configuration(e.to_string()))?;

        Ok(Self {
            pool,
            url: url.into(),
            params: Arc::new(params),
            keyspace: Arc::new(Keyspace::new(
                app.result_serializer,
                app.result_expires,
                ConnectionErrors::standard(),
            )),
        })
    }

    /// Build the backend and verify the server answers
    pub async fn connect_with(options: BackendOptions) -> BackendResult<Self> {
        let backend = Self::new(options)?;
        backend.ping().await?;

        info!(
            "Connected to Redis backend at {}:{}",
            backend.params.host, backend.params.port
        );
        Ok(backend)
    }

    /// URL this backend was configured with
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parameters the pool connects with
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub async fn ping(&self) -> BackendResult<()> {
        let mut conn = self.get_conn().await?;
        self.keyspace.ping(&mut conn).await
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> BackendResult<Connection> {
        self.pool.get().await.map_err(|e| match e {
            PoolError::Backend(err) => self.keyspace.errors().map_error(err, BackendError::Pool),
            other => BackendError::Pool(other.to_string()),
        })
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("host", &self.params.host)
            .field("port", &self.params.port)
            .field("db", &self.params.db)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn connect(url: &str) -> BackendResult<Self> {
        Self::connect_with(BackendOptions::new(url)).await
    }

    fn connection_errors(&self) -> &ConnectionErrors {
        self.keyspace.errors()
    }

    async fn is_connected(&self) -> bool {
        self.ping().await.is_ok()
    }

    async fn close(&self) -> BackendResult<()> {
        self.pool.close();
        Ok(())
    }

    async fn store_result(&self, result: &TaskResult, ttl: Option<Duration>) -> BackendResult<()> {
        let mut conn = self.get_conn().await?;
        self.keyspace.store_result(&mut conn, result, ttl).await
    }

    async fn get_result(&self, task_id: &TaskId) -> BackendResult<Option<TaskResult>> {
        let mut conn = self.get_conn().await?;
        self.keyspace.get_result(&mut conn, task_id).await
    }

    async fn delete_result(&self, task_id: &TaskId) -> BackendResult<bool> {
        let mut conn = self.get_conn().await?;
        self.keyspace.delete_result(&mut conn, task_id).await
    }

    async fn store_meta(&self, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()> {
        let mut conn = self.get_conn().await?;
        self.keyspace.store_meta(&mut conn, task_id, meta).await
    }

    async fn get_meta(&self, task_id: &TaskId) -> BackendResult<Option<TaskMeta>> {
        let mut conn = self.get_conn().await?;
        self.keyspace.get_meta(&mut conn, task_id).await
    }

    async fn update_state(&self, task_id: &TaskId, state: TaskState) -> BackendResult<()> {
        let mut conn = self.get_conn().await?;
        self.keyspace.update_state(&mut conn, task_id, state).await
    }

    async fn get_state(&self, task_id: &TaskId) -> BackendResult<Option<TaskState>> {
        let mut conn = self.get_conn().await?;
        self.keyspace.get_state(&mut conn, task_id).await
    }

    async fn stats(&self) -> BackendResult<BackendStats> {
        let mut conn = self.get_conn().await?;
        self.keyspace.stats(&mut conn).await
    }

    async fn store_raw(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
        let mut conn = self.get_conn().await?;
        self.keyspace.store_raw(&mut conn, key, data, ttl).await
    }

    async fn get_raw(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.get_conn().await?;
        self.keyspace.get_raw(&mut conn, key).await
    }

    async fn delete_raw(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.get_conn().await?;
        self.keyspace.delete_raw(&mut conn, key).await
    }
}
