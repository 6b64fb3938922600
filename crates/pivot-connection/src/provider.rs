//! Connection provider passthrough
//!
//! Every failover task reaches the network through a `ConnectionProvider`.
//! The default implementation builds a URL from the protocol, the host and the
//! database name and hands it to a `DatabaseDriver`.

use std::sync::Arc;

use async_trait::async_trait;
use pivot_core::{
    Connection, ConnectionProperties, DatabaseDriver, HostSpec, PASSWORD_PROPERTY, Result,
    USER_PROPERTY,
};


/// Capability for opening a physical connection to one host
#[async_trait]
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Open a connection to `host`.
    ///
    /// `protocol` is the URL scheme including the separator, e.g. `postgresql://`.
    async fn connect(
        &self,
        protocol: &str,
        host: &HostSpec,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionProvider> ConnectionProvider for Arc<T> {
    async fn connect(
        &self,
        protocol: &str,
        host: &HostSpec,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>> {
        (**self).connect(protocol, host, properties).await
    }
}

/// Forwards connection requests to a `DatabaseDriver`.
///
/// Connectors that expect the credentials under different property names can
/// be given a remapping: the generic `user`/`password` values are copied to the
/// alternate keys. The caller's properties are never modified.
pub struct DriverConnectionProvider {
    driver: Arc<dyn DatabaseDriver>,
    user_property_name: Option<String>,
    password_property_name: Option<String>,
}

impl DriverConnectionProvider {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            user_property_name: None,
            password_property_name: None,
        }
    }

    /// Copy the `user` property to `name` before connecting
    pub fn with_user_property_name(mut self, name: impl Into<String>) -> Self {
        self.user_property_name = Some(name.into());
        self
    }

    /// Copy the `password` property to `name` before connecting
    pub fn with_password_property_name(mut self, name: impl Into<String>) -> Self {
        self.password_property_name = Some(name.into());
        self
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    /// Build the connection URL for `host`
    pub fn build_url(protocol: &str, host: &HostSpec, properties: &ConnectionProperties) -> String {
        format!("{}{}{}", protocol, host.url(), properties.database_name())
    }

    /// Connect with a caller supplied URL, bypassing URL construction
    pub async fn connect_url(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>> {
        self.driver.connect(url, properties).await
    }

    fn remap(&self, properties: &ConnectionProperties) -> ConnectionProperties {
        let mut remapped = properties.clone();
        for (target, source) in [
            (&self.user_property_name, USER_PROPERTY),
            (&self.password_property_name, PASSWORD_PROPERTY),
        ] {
            let Some(target) = target.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            if let Some(value) = properties.get(source).filter(|v| !v.is_empty()) {
                remapped.set(target, value);
            }
        }
        remapped
    }
}

#[async_trait]
impl ConnectionProvider for DriverConnectionProvider {
    #[tracing::instrument(skip(self, properties), fields(host = %host, driver = self.driver.id()))]
    async fn connect(
        &self,
        protocol: &str,
        host: &HostSpec,
        properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>> {
        let url = Self::build_url(protocol, host, properties);
        let properties = self.remap(properties);
        tracing::debug!(url = %url, "opening connection");
        self.driver.connect(&url, &properties).await
    }
}
