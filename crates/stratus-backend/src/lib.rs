//! Stratus Backend - Result storage on Redis and Redis Cluster
//!
//! This crate provides:
//! - The [`Backend`] contract the task queue stores results through
//! - A standard single-node Redis backend
//! - A cluster-aware backend that drives a Redis Cluster client
//! - A selector that picks between them from the configured URL
//!
//! A URL whose scheme starts with `cluster` (for example
//! `cluster://10.0.0.1:7000`) selects the cluster backend.

pub mod cluster;
pub mod errors;
pub mod keyspace;
pub mod params;
pub mod redis;
pub mod result;
pub mod selector;
pub mod traits;

pub use cluster::{cluster_params, RedisClusterBackend};
pub use errors::{ConnectionErrors, TransientErrorKind};
pub use params::{ClusterNode, ConnectionParams, SslCertReqs};
pub use crate::redis::RedisBackend;
pub use result::AsyncResult;
pub use selector::{
    choose_backend, choose_redis_backend, choose_rediss_backend, AnyBackend, BackendOptions,
    Scheme,
};
pub use traits::{Backend, BackendError, BackendResult, BackendStats};
