//! Recognized transient connection errors
//!
//! Each backend carries a [`ConnectionErrors`] set. Client errors that fall
//! into the set surface as [`BackendError::Connection`], which the task queue
//! retries; everything else surfaces as a non-retryable error.

use crate::traits::BackendError;
use redis::{ErrorKind, RedisError};
use std::collections::BTreeSet;

/// Classes of client errors that can be treated as transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransientErrorKind {
    /// Any socket-level I/O failure
    Io,
    /// Server refused the connection
    ConnectionRefused,
    /// Connection reset or closed mid-command
    ConnectionDropped,
    /// Socket timed out
    Timeout,
    /// Cluster-level failure (CLUSTERDOWN, TRYAGAIN, MOVED/ASK, MASTERDOWN)
    Cluster,
}

/// Most specific kinds first, so a refused connection is not reported as plain I/O.
const CLASSIFY_ORDER: [TransientErrorKind; 5] = [
    TransientErrorKind::Cluster,
    TransientErrorKind::Timeout,
    TransientErrorKind::ConnectionRefused,
    TransientErrorKind::ConnectionDropped,
    TransientErrorKind::Io,
];

impl TransientErrorKind {
    fn matches(&self, err: &RedisError) -> bool {
        match self {
            TransientErrorKind::Io => err.is_io_error(),
            TransientErrorKind::ConnectionRefused => err.is_connection_refusal(),
            TransientErrorKind::ConnectionDropped => err.is_connection_dropped(),
            TransientErrorKind::Timeout => err.is_timeout(),
            TransientErrorKind::Cluster => {
                err.is_cluster_error() || err.kind() == ErrorKind::MasterDown
            }
        }
    }
}

impl std::fmt::Display for TransientErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransientErrorKind::Io => "io",
            TransientErrorKind::ConnectionRefused => "connection_refused",
            TransientErrorKind::ConnectionDropped => "connection_dropped",
            TransientErrorKind::Timeout => "timeout",
            TransientErrorKind::Cluster => "cluster",
        };
        f.write_str(name)
    }
}

/// Set of error kinds a backend recognizes as transient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionErrors(BTreeSet<TransientErrorKind>);

impl ConnectionErrors {
    /// Errors recognized by the single-node backend
    pub fn standard() -> Self {
        Self(BTreeSet::from([
            TransientErrorKind::Io,
            TransientErrorKind::ConnectionRefused,
            TransientErrorKind::ConnectionDropped,
            TransientErrorKind::Timeout,
        ]))
    }

    /// Standard errors plus cluster-level failures
    pub fn cluster() -> Self {
        Self::standard().with(TransientErrorKind::Cluster)
    }

    /// Extend the set with one more kind
    pub fn with(mut self, kind: TransientErrorKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn contains(&self, kind: TransientErrorKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TransientErrorKind> + '_ {
        self.0.iter().copied()
    }

    /// Whether every kind in `other` is also in this set
    pub fn is_superset(&self, other: &ConnectionErrors) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Kinds in this set that `other` lacks
    pub fn difference(&self, other: &ConnectionErrors) -> Vec<TransientErrorKind> {
        self.0.difference(&other.0).copied().collect()
    }

    /// Which recognized kind, if any, an error belongs to
    pub fn classify(&self, err: &RedisError) -> Option<TransientErrorKind> {
        CLASSIFY_ORDER
            .iter()
            .copied()
            .filter(|kind| self.contains(*kind))
            .find(|kind| kind.matches(err))
    }

    pub fn is_transient(&self, err: &RedisError) -> bool {
        self.classify(err).is_some()
    }

    /// Convert a client error into a backend error
    ///
    /// Recognized errors become [`BackendError::Connection`]; the rest use `fallback`.
    pub fn map_error(&self, err: RedisError, fallback: fn(String) -> BackendError) -> BackendError {
        match self.classify(&err) {
            Some(kind) => BackendError::Connection(format!("{} ({})", err, kind)),
            None => fallback(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn io_error(kind: io::ErrorKind) -> RedisError {
        RedisError::from(io::Error::new(kind, "socket failure"))
    }

    #[test]
    fn test_cluster_set_adds_exactly_one_kind() {
        let standard = ConnectionErrors::standard();
        let cluster = ConnectionErrors::cluster();

        assert!(cluster.is_superset(&standard));
        assert_eq!(cluster.len(), standard.len() + 1);
        assert_eq!(
            cluster.difference(&standard),
            vec![TransientErrorKind::Cluster]
        );
    }

    #[test]
    fn test_classify_socket_errors() {
        let errors = ConnectionErrors::standard();
        assert_eq!(
            errors.classify(&io_error(io::ErrorKind::ConnectionRefused)),
            Some(TransientErrorKind::ConnectionRefused)
        );
        assert_eq!(
            errors.classify(&io_error(io::ErrorKind::TimedOut)),
            Some(TransientErrorKind::Timeout)
        );
        assert_eq!(
            errors.classify(&io_error(io::ErrorKind::ConnectionReset)),
            Some(TransientErrorKind::ConnectionDropped)
        );
        assert_eq!(
            errors.classify(&io_error(io::ErrorKind::Other)),
            Some(TransientErrorKind::Io)
        );
    }

    #[test]
    fn test_cluster_down_only_transient_for_cluster_set() {
        let err = || RedisError::from((ErrorKind::ClusterDown, "The cluster is down"));

        assert!(!ConnectionErrors::standard().is_transient(&err()));
        assert_eq!(
            ConnectionErrors::cluster().classify(&err()),
            Some(TransientErrorKind::Cluster)
        );
    }

    #[test]
    fn test_map_error_uses_fallback_for_unrecognized() {
        let errors = ConnectionErrors::cluster();

        let mapped = errors.map_error(
            RedisError::from((ErrorKind::TypeError, "wrong type")),
            BackendError::Storage,
        );
        assert!(matches!(mapped, BackendError::Storage(_)));

        let mapped = errors.map_error(
            RedisError::from((ErrorKind::TryAgain, "slot migrating")),
            BackendError::Storage,
        );
        assert!(mapped.is_retryable());
    }
}
