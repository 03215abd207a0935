//! Key layout and commands shared by the single-node and cluster backends
//!
//! Every command runs on any [`redis::aio::ConnectionLike`], so a pooled
//! connection and a cluster connection store results identically.

use crate::errors::ConnectionErrors;
use crate::traits::{BackendError, BackendResult, BackendStats};
use redis::aio::ConnectionLike;
use redis::AsyncCommands;
use std::time::Duration;
use stratus_core::{Serializer, TaskId, TaskMeta, TaskResult, TaskState};
use tracing::debug;

/// Key prefix for result storage
pub const KEY_PREFIX: &str = "stratus:result";

/// Key prefix for metadata storage
pub const META_PREFIX: &str = "stratus:meta";

/// Key prefix for state storage
pub const STATE_PREFIX: &str = "stratus:state";

/// Key prefix for raw payloads
pub const RAW_PREFIX: &str = "stratus:raw";

pub fn result_key(task_id: &TaskId) -> String {
    format!("{}:{}", KEY_PREFIX, task_id)
}

pub fn meta_key(task_id: &TaskId) -> String {
    format!("{}:{}", META_PREFIX, task_id)
}

pub fn state_key(task_id: &TaskId) -> String {
    format!("{}:{}", STATE_PREFIX, task_id)
}

pub fn raw_key(key: &str) -> String {
    format!("{}:{}", RAW_PREFIX, key)
}

/// Storage behaviour for one backend instance
#[derive(Debug, Clone)]
pub struct Keyspace {
    serializer: Serializer,
    default_ttl: u64,
    errors: ConnectionErrors,
}

impl Keyspace {
    /// `default_ttl` of 0 stores values without expiry
    pub fn new(serializer: Serializer, default_ttl: u64, errors: ConnectionErrors) -> Self {
        Self {
            serializer,
            default_ttl,
            errors,
        }
    }

    pub fn errors(&self) -> &ConnectionErrors {
        &self.errors
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Explicit TTLs round up to whole seconds so a sub-second TTL still expires
    fn ttl_secs(&self, ttl: Option<Duration>) -> u64 {
        match ttl {
            Some(d) if d.subsec_nanos() > 0 => d.as_secs() + 1,
            Some(d) => d.as_secs(),
            None => self.default_ttl,
        }
    }

    fn serialize<T: serde::Serialize>(&self, value: &T) -> BackendResult<Vec<u8>> {
        self.serializer
            .serialize(value)
            .map(|b| b.to_vec())
            .map_err(|e| BackendError::Serialization(e.to_string()))
    }

    fn deserialize<T: for<'de> serde::Deserialize<'de>>(&self, data: &[u8]) -> BackendResult<T> {
        self.serializer
            .deserialize(data)
            .map_err(|e| BackendError::Serialization(e.to_string()))
    }

    async fn write<C, V>(&self, conn: &mut C, key: &str, value: V, ttl_secs: u64) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
        V: redis::ToRedisArgs + Send + Sync,
    {
        let written: redis::RedisResult<()> = if ttl_secs == 0 {
            conn.set(key, value).await
        } else {
            conn.set_ex(key, value, ttl_secs).await
        };
        written.map_err(|e| self.errors.map_error(e, BackendError::Storage))
    }

    async fn read<C>(&self, conn: &mut C, key: &str) -> BackendResult<Option<Vec<u8>>>
    where
        C: ConnectionLike + Send,
    {
        conn.get(key)
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Retrieval))
    }

    async fn remove<C>(&self, conn: &mut C, key: &str) -> BackendResult<bool>
    where
        C: ConnectionLike + Send,
    {
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Storage))?;
        Ok(deleted > 0)
    }

    pub async fn ping<C>(&self, conn: &mut C) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
    {
        let _: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Connection))?;
        Ok(())
    }

    pub async fn store_result<C>(
        &self,
        conn: &mut C,
        result: &TaskResult,
        ttl: Option<Duration>,
    ) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
    {
        let data = self.serialize(result)?;
        let ttl_secs = self.ttl_secs(ttl);
        self.write(conn, &result_key(&result.task_id), &data[..], ttl_secs)
            .await?;

        debug!("Stored result for task {} (TTL: {}s)", result.task_id, ttl_secs);
        Ok(())
    }

    pub async fn get_result<C>(&self, conn: &mut C, task_id: &TaskId) -> BackendResult<Option<TaskResult>>
    where
        C: ConnectionLike + Send,
    {
        match self.read(conn, &result_key(task_id)).await? {
            Some(bytes) => Ok(Some(self.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_result<C>(&self, conn: &mut C, task_id: &TaskId) -> BackendResult<bool>
    where
        C: ConnectionLike + Send,
    {
        self.remove(conn, &result_key(task_id)).await
    }

    pub async fn store_meta<C>(&self, conn: &mut C, task_id: &TaskId, meta: &TaskMeta) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
    {
        let data = self.serialize(meta)?;
        self.write(conn, &meta_key(task_id), &data[..], self.default_ttl)
            .await?;

        // Keep the state key in step for quick lookups
        self.update_state(conn, task_id, meta.state).await
    }

    pub async fn get_meta<C>(&self, conn: &mut C, task_id: &TaskId) -> BackendResult<Option<TaskMeta>>
    where
        C: ConnectionLike + Send,
    {
        match self.read(conn, &meta_key(task_id)).await? {
            Some(bytes) => Ok(Some(self.deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn update_state<C>(&self, conn: &mut C, task_id: &TaskId, state: TaskState) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
    {
        self.write(conn, &state_key(task_id), state.to_string(), self.default_ttl)
            .await?;

        debug!("Updated state for task {} to {}", task_id, state);
        Ok(())
    }

    pub async fn get_state<C>(&self, conn: &mut C, task_id: &TaskId) -> BackendResult<Option<TaskState>>
    where
        C: ConnectionLike + Send,
    {
        let state: Option<String> = conn
            .get(state_key(task_id))
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Retrieval))?;

        Ok(state.and_then(|s| s.parse().ok()))
    }

    pub async fn store_raw<C>(
        &self,
        conn: &mut C,
        key: &str,
        data: &[u8],
        ttl: Option<Duration>,
    ) -> BackendResult<()>
    where
        C: ConnectionLike + Send,
    {
        self.write(conn, &raw_key(key), data, self.ttl_secs(ttl)).await
    }

    pub async fn get_raw<C>(&self, conn: &mut C, key: &str) -> BackendResult<Option<Vec<u8>>>
    where
        C: ConnectionLike + Send,
    {
        self.read(conn, &raw_key(key)).await
    }

    pub async fn delete_raw<C>(&self, conn: &mut C, key: &str) -> BackendResult<bool>
    where
        C: ConnectionLike + Send,
    {
        self.remove(conn, &raw_key(key)).await
    }

    /// Count results and states (KEYS scan, use sparingly)
    pub async fn stats<C>(&self, conn: &mut C) -> BackendResult<BackendStats>
    where
        C: ConnectionLike + Send,
    {
        let result_keys: Vec<String> = conn
            .keys(format!("{}:*", KEY_PREFIX))
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Retrieval))?;

        let state_keys: Vec<String> = conn
            .keys(format!("{}:*", STATE_PREFIX))
            .await
            .map_err(|e| self.errors.map_error(e, BackendError::Retrieval))?;

        let mut stats = BackendStats {
            total_results: result_keys.len() as u64,
            ..Default::default()
        };

        for key in state_keys {
            let state: Option<String> = conn
                .get(&key)
                .await
                .map_err(|e| self.errors.map_error(e, BackendError::Retrieval))?;

            match state.and_then(|s| s.parse::<TaskState>().ok()) {
                Some(TaskState::Pending | TaskState::Received | TaskState::Retry) => {
                    stats.pending_count += 1
                }
                Some(TaskState::Running) => stats.running_count += 1,
                Some(TaskState::Success | TaskState::Failure | TaskState::Revoked) => {
                    stats.completed_count += 1
                }
                None => {}
            }
        }

        Ok(stats)
    }
}
