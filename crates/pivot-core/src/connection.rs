//! Connection trait

use crate::{QueryResult, Result};
use async_trait::async_trait;

/// An open database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Run a read-only statement and collect its rows
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Close the connection. Closing an already closed connection is a no-op.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
