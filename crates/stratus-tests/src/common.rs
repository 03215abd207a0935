//! Common test utilities and fixtures

use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Default seed node of the test cluster
pub const DEFAULT_CLUSTER_URL: &str = "cluster://127.0.0.1:7000";

/// Initialize test environment (logging, etc.)
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("stratus_backend=debug")
            .try_init();
    });
}

/// Cluster URL for live tests, overridable with `STRATUS_TEST_CLUSTER_URL`
pub fn cluster_url() -> String {
    std::env::var("STRATUS_TEST_CLUSTER_URL").unwrap_or_else(|_| DEFAULT_CLUSTER_URL.to_string())
}

/// Check if the test cluster's seed node accepts connections
pub async fn cluster_available() -> bool {
    let url = cluster_url();
    let addr = url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("127.0.0.1:7000")
        .to_string();

    matches!(
        tokio::time::timeout(Duration::from_secs(1), tokio::net::TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Generate a unique task ID
pub fn unique_task_id() -> String {
    format!("test_task_{}", uuid::Uuid::new_v4())
}
