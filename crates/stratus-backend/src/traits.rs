//! Backend trait definitions

use crate::errors::ConnectionErrors;
use async_trait::async_trait;
use std::time::Duration;
use stratus_core::{TaskId, TaskMeta, TaskResult, TaskState};
use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transient connection failure; callers may retry
    #[error("connection error: {0}")]
    Connection(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Retrieval error
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Result not found
    #[error("result not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Pool error
    #[error("connection pool error: {0}")]
    Pool(String),

    /// Bad URL, parameters or startup node descriptors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Whether the hosting framework should retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Connection(_))
    }
}

impl From<stratus_core::Error> for BackendError {
    fn from(err: stratus_core::Error) -> Self {
        match err {
            stratus_core::Error::Serialization(msg) | stratus_core::Error::Deserialization(msg) => {
                BackendError::Serialization(msg)
            }
            stratus_core::Error::Configuration(msg) => BackendError::Configuration(msg),
            other => BackendError::Internal(other.to_string()),
        }
    }
}

/// Main backend trait for storing and retrieving task results
#[async_trait]
pub trait Backend: Send + Sync + Clone {
    /// Connect to the backend
    async fn connect(url: &str) -> BackendResult<Self>
    where
        Self: Sized;

    /// Error kinds this backend treats as transient connection failures
    fn connection_errors(&self) -> &ConnectionErrors;

    /// Check if connected
    async fn is_connected(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> BackendResult<()>;

    /// Store a task result
    async fn store_result(&self, result: &TaskResult, ttl: Option<Duration>) -> BackendResult<()>;

    /// Get a task result
    async fn get_result(&self, task_id: &TaskId) -> BackendResult<Option<TaskResult>>;

    /// Delete a task result
    async fn delete_result(&self, task_id: &TaskId) -> BackendResult<bool>;

    /// Store task metadata (state, retries, etc.)
    async fn store_meta(&self, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()>;

    /// Get task metadata
    async fn get_meta(&self, task_id: &TaskId) -> BackendResult<Option<TaskMeta>>;

    /// Update task state
    async fn update_state(&self, task_id: &TaskId, state: TaskState) -> BackendResult<()>;

    /// Get task state
    async fn get_state(&self, task_id: &TaskId) -> BackendResult<Option<TaskState>>;

    /// Check if a result exists
    async fn exists(&self, task_id: &TaskId) -> BackendResult<bool> {
        Ok(self.get_result(task_id).await?.is_some())
    }

    /// Wait for a result with timeout
    async fn wait_for_result(
        &self,
        task_id: &TaskId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> BackendResult<Option<TaskResult>> {
        let start = tokio::time::Instant::now();

        loop {
            if let Some(result) = self.get_result(task_id).await? {
                return Ok(Some(result));
            }

            if start.elapsed() >= timeout {
                return Ok(None);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Get multiple results
    async fn get_results(&self, task_ids: &[TaskId]) -> BackendResult<Vec<Option<TaskResult>>> {
        let mut results = Vec::with_capacity(task_ids.len());
        for task_id in task_ids {
            results.push(self.get_result(task_id).await?);
        }
        Ok(results)
    }

    /// Store multiple results
    async fn store_results(
        &self,
        results: &[TaskResult],
        ttl: Option<Duration>,
    ) -> BackendResult<()> {
        for result in results {
            self.store_result(result, ttl).await?;
        }
        Ok(())
    }

    /// Clean up expired results (Redis expires keys itself)
    async fn cleanup_expired(&self) -> BackendResult<usize> {
        Ok(0)
    }

    /// Get backend statistics
    async fn stats(&self) -> BackendResult<BackendStats>;

    /// Store raw bytes (for workflow state, etc.)
    async fn store_raw(&self, key: &str, data: &[u8], ttl: Option<Duration>) -> BackendResult<()>;

    /// Get raw bytes
    async fn get_raw(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Delete raw data
    async fn delete_raw(&self, key: &str) -> BackendResult<bool>;
}

/// Backend statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Number of stored results
    pub total_results: u64,

    /// Number of pending tasks
    pub pending_count: u64,

    /// Number of running tasks
    pub running_count: u64,

    /// Number of completed tasks (success + failure + revoked)
    pub completed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_retry() {
        assert!(BackendError::Connection("reset".into()).is_retryable());
        assert!(!BackendError::Storage("OOM".into()).is_retryable());
        assert!(!BackendError::Configuration("bad node".into()).is_retryable());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: BackendError = stratus_core::Error::Deserialization("eof".into()).into();
        assert!(matches!(err, BackendError::Serialization(_)));

        let err: BackendError = stratus_core::Error::Configuration("bad".into()).into();
        assert!(matches!(err, BackendError::Configuration(_)));
    }
}
