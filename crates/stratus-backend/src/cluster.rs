//! Redis Cluster result backend
//!
//! The cluster backend starts from the same parameters the single-node
//! backend derives from its URL, then applies [`cluster_params`]:
//! - `db` is dropped (clusters have no logical databases)
//! - `startup_nodes` from the app's transport options become [`ClusterNode`]s
//! - the remaining transport options are merged in
//!
//! The cluster client keeps its own connections, so the backend holds a
//! single client created on first use and shared by every call after that.

use crate::errors::ConnectionErrors;
use crate::keyspace::Keyspace;
use crate::params::{parse_startup_nodes, ClusterNode, ConnectionParams};
use crate::selector::BackendOptions;
use crate::traits::{Backend, BackendError, BackendResult, BackendStats};
use async_trait::async_trait;
use redis::cluster::{ClusterClient, ClusterClientBuilder};
use redis::cluster_async::ClusterConnection;
use std::sync::Arc;
use std::time::Duration;
use stratus_core::{AppConfig, TaskId, TaskMeta, TaskResult, TaskState};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Transport option holding the cluster entry points
pub const STARTUP_NODES: &str = "startup_nodes";

/// Turn single-node parameters into cluster parameters
///
/// Pure: `standard` and the app's transport options are left untouched.
/// Without an app there are no topology hints and `startup_nodes` stays unset.
pub fn cluster_params(
    standard: &ConnectionParams,
    app: Option<&AppConfig>,
) -> BackendResult<ConnectionParams> {
    let mut params = standard.clone();
    params.db = None;
    params.startup_nodes = None;

    let Some(app) = app else {
        return Ok(params);
    };

    let mut options = app.transport_options();
    let startup_nodes = match options.remove(STARTUP_NODES) {
        Some(value) => parse_startup_nodes(&value)?,
        None => None,
    };
    if options.remove("db").is_some() {
        warn!("Ignoring `db` transport option: Redis Cluster has no logical databases");
    }

    let mut params = params.merge(&options)?;
    params.startup_nodes = startup_nodes;
    Ok(params)
}

/// Nodes the client bootstraps from: the startup nodes, else the URL host
pub fn initial_nodes(params: &ConnectionParams) -> Vec<ClusterNode> {
    match &params.startup_nodes {
        Some(nodes) if !nodes.is_empty() => nodes.clone(),
        _ => vec![ClusterNode::new(params.host.clone(), params.port)],
    }
}

fn build_client(params: &ConnectionParams) -> BackendResult<ClusterClient> {
    let nodes = initial_nodes(params)
        .iter()
        .map(|node| params.node_url(&node.host, node.port))
        .collect::<BackendResult<Vec<_>>>()?;

    let mut builder = ClusterClientBuilder::new(nodes);
    if let Some(username) = &params.username {
        builder = builder.username(username.clone());
    }
    if let Some(password) = &params.password {
        builder = builder.password(password.clone());
    }
    if let Some(timeout) = params.socket_timeout()? {
        builder = builder.response_timeout(timeout);
    }
    if let Some(timeout) = params.socket_connect_timeout()? {
        builder = builder.connection_timeout(timeout);
    }
    if let Some(retries) = params.cluster_error_retry_attempts {
        builder = builder.retries(retries);
    }
    if params.read_from_replicas {
        builder = builder.read_from_replicas();
    }

    for (name, set) in [
        ("max_connections", params.max_connections.is_some()),
        ("socket_keepalive", params.socket_keepalive.is_some()),
        ("health_check_interval", params.health_check_interval.is_some()),
        ("client_name", params.client_name.is_some()),
        ("retry_on_timeout", params.retry_on_timeout),
    ] {
        if set {
            debug!("Cluster client manages `{}` itself; option not forwarded", name);
        }
    }
    for name in params.extra.keys() {
        warn!("Unsupported cluster connection option `{}` ignored", name);
    }

    builder
        .build()
        .map_err(|e| BackendError::Configuration(format!("cluster client: {}", e)))
}

struct Inner {
    url: String,
    params: ConnectionParams,
    keyspace: Keyspace,
    client: OnceCell<Arc<ClusterClient>>,
    connection: OnceCell<ClusterConnection>,
}

/// Result backend on a Redis Cluster
///
/// Clones share the cached client.
#[derive(Clone)]
pub struct RedisClusterBackend {
    inner: Arc<Inner>,
}

impl RedisClusterBackend {
    /// Build the backend without touching the network
    ///
    /// `options.url` must already carry a plain `redis`/`rediss` scheme.
    pub fn new(options: BackendOptions) -> BackendResult<Self> {
        let app = options.app_config();
        let url = options.resolve_url(&app);
        let standard = ConnectionParams::from_url(&url, &app)?;
        let params = cluster_params(&standard, options.app.as_deref())?;

        match &params.startup_nodes {
            Some(nodes) => info!(
                "Configured Redis Cluster backend with {} startup node(s)",
                nodes.len()
            ),
            None => info!(
                "Configured Redis Cluster backend seeded from {}:{}",
                params.host, params.port
            ),
        }

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                params,
                keyspace: Keyspace::new(
                    app.result_serializer,
                    app.result_expires,
                    ConnectionErrors::cluster(),
                ),
                client: OnceCell::new(),
                connection: OnceCell::new(),
            }),
        })
    }

    /// URL this backend was configured with, after scheme rewriting
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Final parameters the cluster client is built from
    pub fn params(&self) -> &ConnectionParams {
        &self.inner.params
    }

    /// Whether the cluster client has been created yet
    pub fn has_client(&self) -> bool {
        self.inner.client.initialized()
    }

    /// The cluster client, created on the first call
    ///
    /// Concurrent first calls build exactly one client. A failed build is not
    /// cached, so the next call tries again. A built client is never replaced;
    /// recovering from a bad one takes a new backend.
    pub async fn create_client(&self) -> BackendResult<Arc<ClusterClient>> {
        self.inner
            .client
            .get_or_try_init(|| async {
                let client = build_client(&self.inner.params)?;
                info!(
                    "Created Redis Cluster client ({} initial node(s))",
                    initial_nodes(&self.inner.params).len()
                );
                Ok::<_, BackendError>(Arc::new(client))
            })
            .await
            .map(Arc::clone)
    }

    /// Multiplexed connection on the cached client, opened on the first call
    async fn connection(&self) -> BackendResult<ClusterConnection> {
        self.inner
            .connection
            .get_or_try_init(|| async {
                let client = self.create_client().await?;
                let conn = client
                    .get_async_connection()
                    .await
                    .map_err(|e| self.inner.keyspace.errors().map_error(e, BackendError::Connection))?;
                debug!("Opened Redis Cluster connection");
                Ok::<_, BackendError>(conn)
            })
            .await
            .map(Clone::clone)
    }

    pub async fn ping(&self) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.ping(&mut conn).await
    }
}

impl std::fmt::Debug for RedisClusterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClusterBackend")
            .field("host", &self.inner.params.host)
            .field("port", &self.inner.params.port)
            .field("startup_nodes", &self.inner.params.startup_nodes)
            .field("has_client", &self.has_client())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for RedisClusterBackend {
    /// Accepts both `cluster://` and plain `redis://` URLs
    async fn connect(url: &str) -> BackendResult<Self> {
        let url = match url.strip_prefix(crate::selector::CLUSTER_PREFIX) {
            Some(rest) => format!("redis{}", rest),
            None => url.to_string(),
        };
        let backend = Self::new(BackendOptions::new(url))?;
        backend.ping().await?;
        Ok(backend)
    }

    fn connection_errors(&self) -> &ConnectionErrors {
        self.inner.keyspace.errors()
    }

    async fn is_connected(&self) -> bool {
        self.ping().await.is_ok()
    }

    async fn close(&self) -> BackendResult<()> {
        // The client owns its connections and drops them with the last clone
        Ok(())
    }

    async fn store_result(&self, result: &TaskResult, ttl: Option<Duration>) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.store_result(&mut conn, result, ttl).await
    }

    async fn get_result(&self, task_id: &TaskId) -> BackendResult<Option<TaskResult>> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.get_result(&mut conn, task_id).await
    }

    async fn delete_result(&self, task_id: &TaskId) -> BackendResult<bool> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.delete_result(&mut conn, task_id).await
    }

    async fn store_meta(&self, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.store_meta(&mut conn, task_id, meta).await
    }

    async fn get_meta(&self, task_id: &TaskId) -> BackendResult<Option<TaskMeta>> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.get_meta(&mut conn, task_id).await
    }

    async fn update_state(&self, task_id: &TaskId, state: TaskState) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.update_state(&mut conn, task_id, state).await
    }

    async fn get_state(&self, task_id: &TaskId) -> BackendResult<Option<TaskState>> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.get_state(&mut conn, task_id).await
    }

    async fn stats(&self) -> BackendResult<BackendStats> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.stats(&mut conn).await
    }

    async fn store_raw(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> BackendResult<()> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.store_raw(&mut conn, key, data, ttl).await
    }

    async fn get_raw(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.get_raw(&mut conn, key).await
    }

    async fn delete_raw(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.connection().await?;
        self.inner.keyspace.delete_raw(&mut conn, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app_with_options(options: serde_json::Value) -> AppConfig {
        let mut app = AppConfig::default();
        app.result_backend_transport_options = serde_json::from_value(options).unwrap();
        app
    }

    fn standard(url: &str) -> ConnectionParams {
        ConnectionParams::from_url(url, &AppConfig::default()).unwrap()
    }

    #[test]
    fn test_cluster_params_with_startup_nodes() {
        let app = app_with_options(json!({
            "startup_nodes": [{"host": "h1", "port": 7000}, {"host": "h2", "port": 7001}],
            "max_connections": 10
        }));

        let params = cluster_params(&standard("redis://seed:7000/0"), Some(&app)).unwrap();

        assert_eq!(
            params.startup_nodes,
            Some(vec![ClusterNode::new("h1", 7000), ClusterNode::new("h2", 7001)])
        );
        assert_eq!(params.max_connections, Some(10));
        assert_eq!(params.db, None);

        let map = params.to_map().unwrap();
        assert!(!map.contains_key("db"));
        assert_eq!(map.get("max_connections"), Some(&json!(10)));
        assert!(params.extra.is_empty());
    }

    #[test]
    fn test_cluster_params_without_app() {
        let params = cluster_params(&standard("redis://seed:7000/5"), None).unwrap();
        assert_eq!(params.startup_nodes, None);
        assert_eq!(params.db, None);
        assert_eq!(params.host, "seed");
    }

    #[test]
    fn test_empty_transport_options_match_missing_app() {
        let app = AppConfig::default();
        let base = standard("redis://seed:7000/0");
        assert_eq!(
            cluster_params(&base, Some(&app)).unwrap(),
            cluster_params(&base, None).unwrap()
        );
    }

    #[test]
    fn test_cluster_params_leaves_inputs_alone() {
        let app = app_with_options(json!({
            "startup_nodes": [{"host": "h1", "port": 7000}],
            "socket_timeout": 3
        }));
        let base = standard("redis://seed:7000/0");

        let first = cluster_params(&base, Some(&app)).unwrap();
        let second = cluster_params(&base, Some(&app)).unwrap();

        assert_eq!(first, second);
        assert_eq!(base.db, Some(0));
        assert!(app
            .result_backend_transport_options
            .contains_key(STARTUP_NODES));
    }

    #[test]
    fn test_db_transport_option_is_dropped() {
        let app = app_with_options(json!({"db": 3}));
        let params = cluster_params(&standard("redis://seed:7000/0"), Some(&app)).unwrap();
        assert_eq!(params.db, None);
    }

    #[test]
    fn test_null_startup_nodes_means_unset() {
        let app = app_with_options(json!({"startup_nodes": null}));
        let params = cluster_params(&standard("redis://seed:7000/0"), Some(&app)).unwrap();
        assert_eq!(params.startup_nodes, None);
    }

    #[test]
    fn test_malformed_startup_node_is_configuration_error() {
        let app = app_with_options(json!({"startup_nodes": [{"port": 7000}]}));
        let err = cluster_params(&standard("redis://seed:7000/0"), Some(&app)).unwrap_err();
        assert!(matches!(err, BackendError::Configuration(_)));
    }

    #[test]
    fn test_initial_nodes_fall_back_to_url_host() {
        let params = cluster_params(&standard("redis://seed:7005/0"), None).unwrap();
        assert_eq!(initial_nodes(&params), vec![ClusterNode::new("seed", 7005)]);

        let mut params = params;
        params.startup_nodes = Some(vec![]);
        assert_eq!(initial_nodes(&params), vec![ClusterNode::new("seed", 7005)]);
    }

    #[test]
    fn test_node_urls_drop_database() {
        let params = cluster_params(&standard("redis://:pw@seed:7000/3"), None).unwrap();
        assert_eq!(params.to_url().unwrap(), "redis://:pw@seed:7000");
    }

    #[test]
    fn test_backend_uses_cluster_error_set() {
        let backend = RedisClusterBackend::new(BackendOptions::new("redis://seed:7000")).unwrap();
        let standard = ConnectionErrors::standard();
        let cluster = backend.connection_errors();

        assert!(cluster.is_superset(&standard));
        assert_eq!(cluster.len(), standard.len() + 1);
    }

    #[tokio::test]
    async fn test_create_client_is_memoized() {
        let backend = RedisClusterBackend::new(BackendOptions::new("redis://127.0.0.1:7000")).unwrap();
        assert!(!backend.has_client());

        let first = backend.create_client().await.unwrap();
        let second = backend.create_client().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(backend.has_client());

        // clones share the same cache
        let third = backend.clone().create_client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_builds_one_client() {
        let backend = RedisClusterBackend::new(BackendOptions::new("redis://127.0.0.1:7000")).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.create_client().await.unwrap() })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[tokio::test]
    async fn test_separate_backends_get_separate_clients() {
        let a = RedisClusterBackend::new(BackendOptions::new("redis://127.0.0.1:7000")).unwrap();
        let b = RedisClusterBackend::new(BackendOptions::new("redis://127.0.0.1:7000")).unwrap();

        let client_a = a.create_client().await.unwrap();
        let client_b = b.create_client().await.unwrap();
        assert!(!Arc::ptr_eq(&client_a, &client_b));
    }

    #[tokio::test]
    async fn test_failed_build_is_not_cached() {
        let mut app = AppConfig::default();
        app.redis_socket_timeout = Some(-5.0);
        let backend =
            RedisClusterBackend::new(BackendOptions::new("redis://127.0.0.1:7000").with_app(app))
                .unwrap();

        assert!(backend.create_client().await.is_err());
        assert!(!backend.has_client());
    }
}
