//! Round-trip probe

use std::time::Duration;

use pivot_core::{Connection, PivotError};
use thiserror::Error;
use tokio::time::Instant;

/// Statement sent to prove the server answers queries
pub(super) const LIVENESS_QUERY: &str = "SELECT 1";

pub type PingResult = Result<Duration, PingError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PingError {
    #[error("connection is closed")]
    ConnectionClosed,

    #[error("liveness query failed: {0}")]
    QueryFailed(String),

    #[error("no reply within {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl From<PingError> for PivotError {
    fn from(err: PingError) -> Self {
        PivotError::Validation(err.to_string())
    }
}

/// Run the liveness query on `conn` and return its round-trip time.
///
/// A connection already flagged closed fails without touching the wire.
pub async fn ping_connection(conn: &dyn Connection) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let sent = Instant::now();
    conn.query(LIVENESS_QUERY)
        .await
        .map_err(|e| PingError::QueryFailed(e.to_string()))?;
    Ok(sent.elapsed())
}
