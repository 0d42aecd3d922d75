//! Error types for the clustering core
//!
//! Covers coordination-backend, placement, and peer-RPC failures.

use thiserror::Error;

/// Primary error type for all clustering operations
#[derive(Debug, Error)]
pub enum ClusterError {
    // ========== Placement Errors ==========

    /// No registered services to place a target on
    #[error("no registered services found")]
    NotFound,

    /// Every candidate service was denied during one placement
    #[error("no more suitable services for this target")]
    NoMoreSuitableServices,

    /// The chosen worker never acquired the target lock in time
    #[error("service {service} did not lock target {target} within the assignment timeout")]
    ConfirmationTimeout { target: String, service: String },

    // ========== Coordination Errors ==========

    /// A locker call failed; transient, callers retry with backoff
    #[error("locker operation failed: {message}")]
    Coordination { message: String },

    /// The locker was stopped while an operation was in flight
    #[error("locker is stopped")]
    LockerStopped,

    // ========== Peer RPC Errors ==========

    /// A worker API call returned a failure status
    #[error("request to {service} failed with status code={status}")]
    PeerRpcStatus { service: String, status: u16 },

    /// A worker API call failed at the transport level
    #[error("request to {service} failed: {message}")]
    PeerRpcTransport { service: String, message: String },

    /// Cluster-wide target removal failed on one or more workers
    #[error("{failures} request(s) failed while deleting target {target:?}")]
    DeleteTarget { target: String, failures: usize },

    // ========== Startup Errors ==========

    /// Invalid clustering configuration, surfaced at process start
    #[error("invalid clustering config: {message}")]
    Config { message: String },

    /// Unknown locker backend in the clustering config
    #[error("unknown locker type {locker_type:?}")]
    UnknownLockerType { locker_type: String },
}

impl ClusterError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::Coordination { .. }
                | ClusterError::PeerRpcStatus { .. }
                | ClusterError::PeerRpcTransport { .. }
                | ClusterError::ConfirmationTimeout { .. }
        )
    }

    /// Returns true if this error ends the current dispatch pass
    pub fn aborts_pass(&self) -> bool {
        matches!(self, ClusterError::NotFound)
    }
}

/// Result type alias for clustering operations
pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(ClusterError::Coordination { message: "io".into() }.is_retryable());
        assert!(!ClusterError::NotFound.is_retryable());
        assert!(!ClusterError::Config { message: "x".into() }.is_retryable());
    }

    #[test]
    fn not_found_aborts_pass() {
        assert!(ClusterError::NotFound.aborts_pass());
        assert!(!ClusterError::NoMoreSuitableServices.aborts_pass());
    }
}
