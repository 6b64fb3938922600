use std::time::Duration;

use pivot_core::{Connection, Result};

use super::{PingError, ping_connection};

/// Check that `conn` completes a round trip within `timeout`.
///
/// Every failure, including a closed connection and an expired timeout, is
/// reported as `PivotError::Validation`. The connection is left open; closing
/// it is up to the caller.
pub async fn validate_connection(conn: &dyn Connection, timeout: Duration) -> Result<Duration> {
    let latency = match tokio::time::timeout(timeout, ping_connection(conn)).await {
        Ok(result) => result?,
        Err(_) => return Err(PingError::Timeout(timeout).into()),
    };
    tracing::trace!(latency_ms = latency.as_millis() as u64, "connection validated");
    Ok(latency)
}
