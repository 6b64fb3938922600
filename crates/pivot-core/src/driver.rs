//! Database driver trait definition

use crate::{Connection, ConnectionProperties, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The network connector that performs the physical handshake.
///
/// Implementations receive a full URL such as `postgresql://db-1:5432/orders`
/// and the (possibly remapped) connection properties.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgres")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Human-readable name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// URL scheme including the separator, e.g. `postgresql://`
    fn protocol(&self) -> &'static str;

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Open a new connection
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>>;
}
