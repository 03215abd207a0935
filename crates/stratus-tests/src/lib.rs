//! Stratus Integration Tests
//!
//! Offline tests run with `cargo test -p stratus-tests`.
//!
//! Tests that need a live Redis Cluster are ignored by default:
//! ```sh
//! docker run -d --net host -e IP=0.0.0.0 grokzen/redis-cluster:7.0.10
//! STRATUS_TEST_CLUSTER_URL=cluster://127.0.0.1:7000 \
//!     cargo test -p stratus-tests -- --ignored
//! ```

pub mod common;
