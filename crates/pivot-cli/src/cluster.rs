//! Wiring from a cluster file to provider, topology service and handlers

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pivot_connection::{
    CachedTopologyService, ConnectionProvider, DriverConnectionProvider, QueryTopologySource,
    StaticTopologySource, TopologyQuery, TopologyService, TopologySource,
};
use pivot_core::{ConnectionProperties, DatabaseDriver, Topology};
use pivot_driver_postgres::PostgresDriver;
use pivot_failover::{FailoverConfig, ReaderFailoverHandler, WriterFailoverHandler};

use crate::config::ClusterConfig;

pub struct Cluster {
    provider: Arc<dyn ConnectionProvider>,
    topology: Arc<CachedTopologyService>,
    protocol: &'static str,
    properties: ConnectionProperties,
    failover: FailoverConfig,
}

impl Cluster {
    pub fn connect(config: &ClusterConfig, failover: FailoverConfig) -> anyhow::Result<Self> {
        let driver = Arc::new(PostgresDriver::new());
        let protocol = driver.protocol();
        let provider: Arc<dyn ConnectionProvider> =
            Arc::new(DriverConnectionProvider::new(driver));
        let properties = config.connection_properties()?;

        let source: Arc<dyn TopologySource> = if config.uses_static_topology() {
            let topology = Topology::new(config.hosts.clone())
                .context("[cluster] hosts do not form a valid topology")?;
            Arc::new(StaticTopologySource::new(topology))
        } else {
            let mut source = QueryTopologySource::new(
                provider.clone(),
                protocol,
                config.endpoint_specs()?,
                properties.clone(),
                TopologyQuery::aurora_postgresql(),
            );
            if let Some(pattern) = &config.instance_host_pattern {
                source = source.with_instance_host_pattern(pattern.clone())?;
            }
            if let Some(port) = config.instance_port {
                source = source.with_instance_port(port);
            }
            Arc::new(source)
        };

        let topology = Arc::new(CachedTopologyService::new(
            source,
            Duration::from_millis(config.topology_refresh_ms),
        ));
        tracing::debug!(
            static_topology = config.uses_static_topology(),
            endpoints = config.endpoints.len(),
            "cluster wiring ready"
        );

        Ok(Self {
            provider,
            topology,
            protocol,
            properties,
            failover,
        })
    }

    pub async fn topology(&self) -> anyhow::Result<Topology> {
        let topology = self
            .topology
            .topology(true)
            .await
            .context("failed to fetch cluster topology")?;
        Ok(topology)
    }

    pub fn writer_handler(&self) -> WriterFailoverHandler {
        WriterFailoverHandler::new(
            self.provider.clone(),
            self.topology.clone(),
            self.protocol,
            self.properties.clone(),
            self.failover.clone(),
        )
    }

    pub fn reader_handler(&self) -> ReaderFailoverHandler {
        ReaderFailoverHandler::new(
            self.provider.clone(),
            self.protocol,
            self.properties.clone(),
            self.failover.clone(),
        )
    }
}
