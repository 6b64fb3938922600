//! Error types for Pivot

use std::time::Duration;

use thiserror::Error;

/// Core error type for Pivot operations
#[derive(Error, Debug)]
pub enum PivotError {
    /// Host unreachable, authentication rejected or handshake failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection opened but failed the liveness check
    #[error("Validation error: {0}")]
    Validation(String),

    /// Topology collaborator unavailable or returned an unusable snapshot
    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Failover timed out after {0:?}")]
    FailoverTimeout(Duration),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PivotError {
    /// Whether the error came from the topology collaborator.
    pub fn is_topology(&self) -> bool {
        matches!(self, PivotError::Topology(_))
    }

    /// Diagnostic rank used to pick between two failures.
    ///
    /// Higher is more specific: topology-derived errors carry the most context
    /// about the cluster, a failed liveness check says more than a refused socket.
    pub fn specificity(&self) -> u8 {
        match self {
            PivotError::Topology(_) => 3,
            PivotError::Validation(_) => 2,
            PivotError::Connection(_) | PivotError::Timeout(_) | PivotError::Io(_) => 1,
            _ => 0,
        }
    }

    /// Return whichever of the two errors is more specific, preferring `self` on ties.
    pub fn more_specific(self, other: PivotError) -> PivotError {
        if other.specificity() > self.specificity() {
            other
        } else {
            self
        }
    }
}

/// Result type alias for Pivot operations
pub type Result<T> = std::result::Result<T, PivotError>;
