//! A single connect-and-validate attempt

use std::sync::Arc;
use std::time::Duration;

use pivot_connection::{ConnectionProvider, validate_connection};
use pivot_core::{Connection, ConnectionProperties, HostSpec, PivotError, Result};
use tokio::time::Instant;

/// Open a connection to `host` and confirm it completes a round trip.
///
/// `timeout` bounds connect and validation together. A connection that opens
/// but fails validation is closed before the error is returned.
pub(crate) async fn connect_and_validate(
    provider: &dyn ConnectionProvider,
    protocol: &str,
    host: &HostSpec,
    properties: &ConnectionProperties,
    timeout: Duration,
) -> Result<Arc<dyn Connection>> {
    let started = Instant::now();
    let conn = match tokio::time::timeout(timeout, provider.connect(protocol, host, properties)).await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(PivotError::Timeout(format!(
                "connect to {} timed out after {:?}",
                host, timeout
            )));
        }
    };

    let remaining = timeout.saturating_sub(started.elapsed());
    if let Err(e) = validate_connection(conn.as_ref(), remaining).await {
        close_quietly(&conn).await;
        return Err(e);
    }
    Ok(conn)
}

/// Close a connection nobody will adopt
pub(crate) async fn close_quietly(conn: &Arc<dyn Connection>) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "failed to close discarded connection");
    }
}
