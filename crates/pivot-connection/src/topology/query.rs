use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pivot_core::{
    Connection, ConnectionProperties, HostRole, HostSpec, PivotError, Result, Row, Topology, Value,
};
use tokio::sync::Mutex;

use super::TopologySource;
use crate::ConnectionProvider;

/// Query describing how to read cluster membership from a monitoring connection
#[derive(Debug, Clone)]
pub struct TopologyQuery {
    pub sql: String,
    /// Column holding the instance identifier
    pub host_column: String,
    /// Column that identifies the writer
    pub writer_column: String,
    /// Text value of `writer_column` that marks the writer. Without one the
    /// column is read as a boolean flag.
    pub writer_value: Option<String>,
    pub last_updated_column: Option<String>,
}

impl TopologyQuery {
    /// Aurora PostgreSQL replica status, ignoring instances that have not
    /// reported within five minutes
    pub fn aurora_postgresql() -> Self {
        Self {
            sql: "SELECT server_id, session_id, last_update_timestamp \
                  FROM aurora_replica_status() \
                  WHERE EXTRACT(EPOCH FROM (NOW() - last_update_timestamp)) <= 300 \
                  OR session_id = 'MASTER_SESSION_ID' \
                  OR last_update_timestamp IS NULL"
                .to_string(),
            host_column: "server_id".to_string(),
            writer_column: "session_id".to_string(),
            writer_value: Some("MASTER_SESSION_ID".to_string()),
            last_updated_column: Some("last_update_timestamp".to_string()),
        }
    }

    /// A query returning a host column and a boolean writer column
    pub fn custom(
        sql: impl Into<String>,
        host_column: impl Into<String>,
        writer_column: impl Into<String>,
    ) -> Self {
        Self {
            sql: sql.into(),
            host_column: host_column.into(),
            writer_column: writer_column.into(),
            writer_value: None,
            last_updated_column: None,
        }
    }

    pub fn with_writer_value(mut self, value: impl Into<String>) -> Self {
        self.writer_value = Some(value.into());
        self
    }

    pub fn with_last_updated_column(mut self, column: impl Into<String>) -> Self {
        self.last_updated_column = Some(column.into());
        self
    }

    /// Whether a `writer_column` value marks the writer
    pub fn is_writer(&self, value: &Value) -> bool {
        match (value, self.writer_value.as_deref()) {
            (Value::String(s), Some(marker)) => s == marker,
            (Value::String(s), None) => matches!(s.to_ascii_lowercase().as_str(), "t" | "true" | "1"),
            (Value::Bool(b), _) => *b,
            (other, _) => other.as_i64().is_some_and(|v| v != 0),
        }
    }

    fn host_from_row(&self, row: &Row, pattern: Option<&str>, port: Option<u16>) -> Option<HostSpec> {
        let instance = match row.get_by_name(&self.host_column)? {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        let host = match pattern {
            Some(pattern) => pattern.replace('?', &instance),
            None => instance,
        };

        let role = match row.get_by_name(&self.writer_column) {
            Some(value) if self.is_writer(value) => HostRole::Writer,
            _ => HostRole::Reader,
        };

        let mut spec = HostSpec::new(host, port).with_role(role);
        if let Some(updated) = self
            .last_updated_column
            .as_deref()
            .and_then(|col| row.get_by_name(col))
            .and_then(Value::as_datetime_utc)
        {
            spec = spec.with_last_updated(updated);
        }
        Some(spec)
    }
}

/// Discovers topology by querying the cluster itself.
///
/// A monitoring connection is opened through the provider to the first
/// reachable endpoint and reused across fetches. A failed query drops it so the
/// next fetch reconnects.
pub struct QueryTopologySource {
    provider: Arc<dyn ConnectionProvider>,
    protocol: String,
    endpoints: Vec<HostSpec>,
    properties: ConnectionProperties,
    query: TopologyQuery,
    instance_host_pattern: Option<String>,
    instance_port: Option<u16>,
    monitoring: Mutex<Option<Arc<dyn Connection>>>,
}

impl QueryTopologySource {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        protocol: impl Into<String>,
        endpoints: Vec<HostSpec>,
        properties: ConnectionProperties,
        query: TopologyQuery,
    ) -> Self {
        let instance_port = endpoints.first().and_then(HostSpec::port);
        Self {
            provider,
            protocol: protocol.into(),
            endpoints,
            properties,
            query,
            instance_host_pattern: None,
            instance_port,
            monitoring: Mutex::new(None),
        }
    }

    /// Template for instance host names; `?` is replaced with the instance id,
    /// e.g. `?.cluster-abc.us-east-1.rds.amazonaws.com`.
    pub fn with_instance_host_pattern(mut self, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if !pattern.contains('?') {
            return Err(PivotError::Configuration(format!(
                "instance host pattern '{}' must contain '?'",
                pattern
            )));
        }
        self.instance_host_pattern = Some(pattern);
        Ok(self)
    }

    /// Port used for discovered instances. Defaults to the first endpoint's port.
    pub fn with_instance_port(mut self, port: u16) -> Self {
        self.instance_port = Some(port);
        self
    }

    async fn open_monitoring(&self) -> Result<Arc<dyn Connection>> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self
                .provider
                .connect(&self.protocol, endpoint, &self.properties)
                .await
            {
                Ok(conn) => {
                    tracing::debug!(endpoint = %endpoint, "monitoring connection opened");
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "monitoring endpoint unreachable");
                    last_error = Some(e);
                }
            }
        }
        Err(PivotError::Topology(match last_error {
            Some(e) => format!("no cluster endpoint reachable: {}", e),
            None => "no cluster endpoints configured".to_string(),
        }))
    }

    fn build_topology(&self, rows: &[Row]) -> Result<Topology> {
        let mut hosts: Vec<HostSpec> = rows
            .iter()
            .filter_map(|row| {
                self.query.host_from_row(
                    row,
                    self.instance_host_pattern.as_deref(),
                    self.instance_port,
                )
            })
            .collect();

        if hosts.is_empty() {
            return Err(PivotError::Topology("topology query returned no hosts".into()));
        }

        demote_stale_writers(&mut hosts);
        Topology::new(hosts)
    }
}

/// While a writer election is in progress the cluster can briefly report two
/// writers. Keep the most recently updated one.
fn demote_stale_writers(hosts: &mut [HostSpec]) {
    let latest = hosts
        .iter()
        .enumerate()
        .filter(|(_, h)| h.is_writer())
        .max_by_key(|(_, h)| h.last_updated().unwrap_or(DateTime::<Utc>::MIN_UTC))
        .map(|(idx, _)| idx);

    let Some(keep) = latest else {
        return;
    };
    for (idx, host) in hosts.iter_mut().enumerate() {
        if idx != keep && host.is_writer() {
            tracing::debug!(host = %host, "demoting stale writer entry");
            *host = host.clone().with_role(HostRole::Reader);
        }
    }
}

#[async_trait]
impl TopologySource for QueryTopologySource {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self) -> Result<Topology> {
        let mut monitoring = self.monitoring.lock().await;

        let conn = match monitoring.as_ref().filter(|c| !c.is_closed()) {
            Some(conn) => conn.clone(),
            None => {
                let conn = self.open_monitoring().await?;
                *monitoring = Some(conn.clone());
                conn
            }
        };

        match conn.query(&self.query.sql).await {
            Ok(result) => self.build_topology(&result.rows),
            Err(e) => {
                *monitoring = None;
                if let Err(close_err) = conn.close().await {
                    tracing::debug!(error = %close_err, "failed to close monitoring connection");
                }
                Err(PivotError::Topology(format!("topology query failed: {}", e)))
            }
        }
    }
}
