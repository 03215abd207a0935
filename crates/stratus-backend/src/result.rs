//! Handle for waiting on a task's stored result

use crate::traits::{Backend, BackendResult};
use std::time::Duration;
use stratus_core::{TaskId, TaskResult, TaskState};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Async result handle for one task
pub struct AsyncResult<B: Backend> {
    task_id: TaskId,
    backend: B,
}

impl<B: Backend> AsyncResult<B> {
    pub fn new(task_id: TaskId, backend: B) -> Self {
        Self { task_id, backend }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Check if the task reached a terminal state
    pub async fn ready(&self) -> BackendResult<bool> {
        let state = self.backend.get_state(&self.task_id).await?;
        Ok(state.map(|s| s.is_terminal()).unwrap_or(false))
    }

    /// Get the current state
    pub async fn state(&self) -> BackendResult<Option<TaskState>> {
        self.backend.get_state(&self.task_id).await
    }

    /// Get the result (None if not stored yet)
    pub async fn get(&self) -> BackendResult<Option<TaskResult>> {
        self.backend.get_result(&self.task_id).await
    }

    /// Wait for the result with timeout
    pub async fn wait(&self, timeout: Duration) -> BackendResult<Option<TaskResult>> {
        self.backend
            .wait_for_result(&self.task_id, timeout, POLL_INTERVAL)
            .await
    }

    /// Wait indefinitely for the result
    pub async fn wait_forever(&self) -> BackendResult<TaskResult> {
        loop {
            if let Some(result) = self.get().await? {
                return Ok(result);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConnectionErrors;
    use crate::traits::{BackendError, BackendStats};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use stratus_core::TaskMeta;

    /// In-memory backend for exercising the handle
    #[derive(Clone)]
    struct MemoryBackend {
        results: Arc<Mutex<HashMap<TaskId, TaskResult>>>,
        states: Arc<Mutex<HashMap<TaskId, TaskState>>>,
        errors: Arc<ConnectionErrors>,
    }

    impl Default for MemoryBackend {
        fn default() -> Self {
            Self {
                results: Arc::default(),
                states: Arc::default(),
                errors: Arc::new(ConnectionErrors::standard()),
            }
        }
    }

    #[async_trait]
    impl Backend for MemoryBackend {
        async fn connect(_url: &str) -> BackendResult<Self> {
            Ok(Self::default())
        }

        fn connection_errors(&self) -> &ConnectionErrors {
            &self.errors
        }

        async fn is_connected(&self) -> bool {
            true
        }

        async fn close(&self) -> BackendResult<()> {
            Ok(())
        }

        async fn store_result(&self, result: &TaskResult, _ttl: Option<Duration>) -> BackendResult<()> {
            self.results
                .lock()
                .unwrap()
                .insert(result.task_id.clone(), result.clone());
            self.update_state(&result.task_id, result.state).await
        }

        async fn get_result(&self, task_id: &TaskId) -> BackendResult<Option<TaskResult>> {
            Ok(self.results.lock().unwrap().get(task_id).cloned())
        }

        async fn delete_result(&self, task_id: &TaskId) -> BackendResult<bool> {
            Ok(self.results.lock().unwrap().remove(task_id).is_some())
        }

        async fn store_meta(&self, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()> {
            self.update_state(task_id, meta.state).await
        }

        async fn get_meta(&self, _task_id: &TaskId) -> BackendResult<Option<TaskMeta>> {
            Ok(None)
        }

        async fn update_state(&self, task_id: &TaskId, state: TaskState) -> BackendResult<()> {
            self.states.lock().unwrap().insert(task_id.clone(), state);
            Ok(())
        }

        async fn get_state(&self, task_id: &TaskId) -> BackendResult<Option<TaskState>> {
            Ok(self.states.lock().unwrap().get(task_id).copied())
        }

        async fn stats(&self) -> BackendResult<BackendStats> {
            Err(BackendError::Internal("not tracked".into()))
        }

        async fn store_raw(&self, _key: &str, _data: &[u8], _ttl: Option<Duration>) -> BackendResult<()> {
            Ok(())
        }

        async fn get_raw(&self, _key: &str) -> BackendResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_raw(&self, _key: &str) -> BackendResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_ready_follows_state() {
        let backend = MemoryBackend::default();
        let task_id = TaskId::new();
        let handle = AsyncResult::new(task_id.clone(), backend.clone());

        assert!(!handle.ready().await.unwrap());

        backend.update_state(&task_id, TaskState::Running).await.unwrap();
        assert!(!handle.ready().await.unwrap());

        backend
            .store_result(&TaskResult::success(task_id.clone(), 7).unwrap(), None)
            .await
            .unwrap();
        assert!(handle.ready().await.unwrap());
        assert_eq!(handle.get().await.unwrap().unwrap().get::<i32>().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let handle = AsyncResult::new(TaskId::new(), MemoryBackend::default());
        let result = handle.wait(Duration::from_secs(1)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_forever_sees_late_result() {
        let backend = MemoryBackend::default();
        let task_id = TaskId::new();
        let handle = AsyncResult::new(task_id.clone(), backend.clone());

        let writer = {
            let task_id = task_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(350)).await;
                backend
                    .store_result(&TaskResult::revoked(task_id), None)
                    .await
                    .unwrap();
            })
        };

        let result = handle.wait_forever().await.unwrap();
        assert_eq!(result.state, TaskState::Revoked);
        writer.await.unwrap();
    }
}
