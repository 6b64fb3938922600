//! PostgreSQL driver implementation

use async_trait::async_trait;
use pivot_core::{
    Connection, ConnectionProperties, DatabaseDriver, PivotError, Result, USER_PROPERTY,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::tls::TlsSettings;
use crate::PostgresConnection;

const DEFAULT_APPLICATION_NAME: &str = "pivot";

/// PostgreSQL network connector
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn id(&self) -> &'static str {
        "postgres"
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn protocol(&self) -> &'static str {
        "postgresql://"
    }

    fn default_port(&self) -> Option<u16> {
        Some(5432)
    }

    #[tracing::instrument(skip(self, properties), fields(user = properties.get(USER_PROPERTY)))]
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>> {
        let (config, tls) = connect_config(url, properties)?;
        let conn = PostgresConnection::connect(&config, &tls)
            .await
            .inspect_err(|e| tracing::debug!(error = %e, "failed to connect to PostgreSQL"))?;
        Ok(Arc::new(conn))
    }
}

/// Turn a connect URL plus properties into a tokio-postgres configuration.
///
/// The URL carries host, port and database. Credentials and options come
/// from the properties and override anything embedded in the URL:
///
/// - `user`, `password`
/// - `connect_timeout` in seconds
/// - `application_name`, defaulting to `pivot`
/// - `keepalives` (`true`/`false`)
/// - the TLS options read by [`TlsSettings::from_properties`]
pub fn connect_config(
    url: &str,
    properties: &ConnectionProperties,
) -> Result<(tokio_postgres::Config, TlsSettings)> {
    let mut config = tokio_postgres::Config::from_str(url)
        .map_err(|e| PivotError::Configuration(format!("invalid PostgreSQL URL '{}': {}", url, e)))?;

    if let Some(user) = properties.user.as_deref().filter(|u| !u.is_empty()) {
        config.user(user);
    }
    if let Some(password) = properties.password.as_deref() {
        config.password(password);
    }

    if let Some(raw) = properties.get("connect_timeout") {
        let secs: u64 = raw.trim().parse().map_err(|_| {
            PivotError::Configuration(format!("connect_timeout must be whole seconds, got '{}'", raw))
        })?;
        config.connect_timeout(Duration::from_secs(secs));
    }

    let application_name = properties
        .get("application_name")
        .unwrap_or(DEFAULT_APPLICATION_NAME);
    config.application_name(application_name);

    if let Some(keepalives) = properties.get_parsed::<bool>("keepalives") {
        config.keepalives(keepalives);
    }

    let tls = TlsSettings::from_properties(properties)?;
    config.ssl_mode(tls.mode.postgres_ssl_mode());
    Ok((config, tls))
}

#[cfg(test)]
mod tests;
