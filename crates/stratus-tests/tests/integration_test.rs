//! Integration tests against a live Redis Cluster
//!
//! Run with: cargo test -p stratus-tests -- --ignored

use std::time::Duration;
use stratus_backend::{choose_redis_backend, AsyncResult, Backend, BackendOptions};
use stratus_core::{AppConfig, TaskId, TaskMeta, TaskResult, TaskState};
use stratus_telemetry::BackendLogContext;
use stratus_tests::common;
use tracing::Instrument;

fn cluster_backend() -> stratus_backend::AnyBackend {
    choose_redis_backend(BackendOptions::new(common::cluster_url()).with_app(AppConfig::default()))
        .expect("Failed to build cluster backend")
}

/// Test that the cluster backend connects and answers PING
#[tokio::test]
#[ignore = "requires Redis Cluster"]
async fn test_cluster_backend_connection() {
    common::init();
    if !common::cluster_available().await {
        eprintln!("Redis Cluster not reachable, skipping");
        return;
    }

    let backend = cluster_backend();
    assert!(backend.is_cluster());
    assert!(backend.is_connected().await, "Backend should be connected");
}

/// Test storing and reading results across slots
#[tokio::test]
#[ignore = "requires Redis Cluster"]
async fn test_cluster_result_roundtrip() -> anyhow::Result<()> {
    common::init();
    if !common::cluster_available().await {
        return Ok(());
    }

    let backend = cluster_backend();
    let ctx = BackendLogContext::cluster("127.0.0.1", 7000);

    async {
        // distinct ids land on different hash slots
        for _ in 0..20 {
            let task_id = TaskId::from(common::unique_task_id());
            let result = TaskResult {
                task_id: task_id.clone(),
                state: TaskState::Success,
                result: Some(serde_json::json!({"output": "test result", "count": 42})),
                error: None,
                traceback: None,
                created_at: chrono::Utc::now(),
            };

            backend.store_result(&result, Some(Duration::from_secs(60))).await?;
            let stored = backend.get_result(&task_id).await?.expect("stored result");
            assert_eq!(stored.result, result.result);

            assert!(backend.delete_result(&task_id).await?);
        }
        Ok::<_, anyhow::Error>(())
    }
    .instrument(ctx.span())
    .await
}

/// Test metadata and state tracking
#[tokio::test]
#[ignore = "requires Redis Cluster"]
async fn test_cluster_meta_and_state() -> anyhow::Result<()> {
    common::init();
    if !common::cluster_available().await {
        return Ok(());
    }

    let backend = cluster_backend();
    let task_id = TaskId::from(common::unique_task_id());

    let mut meta = TaskMeta::new();
    meta.mark_started("worker-1");
    backend.store_meta(&task_id, &meta).await?;

    assert_eq!(backend.get_state(&task_id).await?, Some(TaskState::Running));
    let stored = backend.get_meta(&task_id).await?.expect("stored meta");
    assert_eq!(stored.worker_id.as_deref(), Some("worker-1"));

    backend.update_state(&task_id, TaskState::Success).await?;
    let handle = AsyncResult::new(task_id.clone(), backend.clone());
    assert!(handle.ready().await?);

    Ok(())
}

/// Test raw payload storage
#[tokio::test]
#[ignore = "requires Redis Cluster"]
async fn test_cluster_raw_storage() -> anyhow::Result<()> {
    common::init();
    if !common::cluster_available().await {
        return Ok(());
    }

    let backend = cluster_backend();
    let key = common::unique_task_id();

    backend.store_raw(&key, b"chord-state", None).await?;
    assert_eq!(backend.get_raw(&key).await?, Some(b"chord-state".to_vec()));
    assert!(backend.delete_raw(&key).await?);
    assert_eq!(backend.get_raw(&key).await?, None);

    Ok(())
}

/// Test that all operations share one cached client
#[tokio::test]
#[ignore = "requires Redis Cluster"]
async fn test_cluster_client_reused_across_operations() -> anyhow::Result<()> {
    common::init();
    if !common::cluster_available().await {
        return Ok(());
    }

    let backend = cluster_backend();
    let cluster = backend.as_cluster().expect("cluster backend");

    assert!(backend.is_connected().await);
    let client = cluster.create_client().await?;
    backend.stats().await?;
    assert!(std::sync::Arc::ptr_eq(&client, &cluster.create_client().await?));

    Ok(())
}
