//! Cluster file loading
//!
//! ```toml
//! [cluster]
//! endpoints = ["orders.cluster-abc.us-east-1.rds.amazonaws.com:5432"]
//! instance_host_pattern = "?.abc.us-east-1.rds.amazonaws.com"
//! database = "orders"
//! user = "app"
//! password_env = "PIVOT_PASSWORD"
//!
//! [cluster.properties]
//! sslmode = "require"
//!
//! [failover]
//! failover_timeout_ms = 30000
//!
//! [logging]
//! json_file = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use pivot_core::{ConnectionProperties, HostSpec};
use pivot_failover::FailoverConfig;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotConfig {
    pub cluster: ClusterConfig,
    pub failover: FailoverConfig,
    pub logging: LoggingConfig,
}

/// `[cluster]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// `host[:port]` entries tried in order for the monitoring connection
    pub endpoints: Vec<String>,

    /// Fixed membership. When present the cluster is not queried for topology.
    pub hosts: Vec<HostSpec>,

    /// Instance host template, `?` is replaced with the instance id
    pub instance_host_pattern: Option<String>,

    pub instance_port: Option<u16>,

    /// How long an unforced topology read may be served from cache
    pub topology_refresh_ms: u64,

    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Environment variable holding the password, read at startup
    pub password_env: Option<String>,

    /// Passed to the driver untouched
    pub properties: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            hosts: Vec::new(),
            instance_host_pattern: None,
            instance_port: None,
            topology_refresh_ms: 30_000,
            database: None,
            user: None,
            password: None,
            password_env: None,
            properties: BTreeMap::new(),
        }
    }
}

impl PivotConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cluster file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse cluster file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.cluster.validate()?;
        self.failover.validate().context("invalid [failover] section")?;
        Ok(())
    }
}

/// Default cluster file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pivot")
        .join("pivot.toml")
}

impl ClusterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoints.is_empty() && self.hosts.is_empty() {
            bail!("[cluster] needs either endpoints or hosts");
        }
        if self.password.is_some() && self.password_env.is_some() {
            bail!("[cluster] sets both password and password_env");
        }
        if let Some(pattern) = &self.instance_host_pattern {
            if !pattern.contains('?') {
                bail!("instance_host_pattern '{}' must contain '?'", pattern);
            }
        }
        self.endpoint_specs()?;
        Ok(())
    }

    pub fn uses_static_topology(&self) -> bool {
        !self.hosts.is_empty()
    }

    pub fn endpoint_specs(&self) -> anyhow::Result<Vec<HostSpec>> {
        self.endpoints.iter().map(|e| parse_endpoint(e)).collect()
    }

    /// Connection properties with the password resolved
    pub fn connection_properties(&self) -> anyhow::Result<ConnectionProperties> {
        let password = match &self.password_env {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("password_env {} is not set", var))?,
            ),
            None => self.password.clone(),
        };
        Ok(ConnectionProperties {
            database: self.database.clone(),
            user: self.user.clone(),
            password,
            extra: self.properties.clone(),
        })
    }
}

/// Parse `host[:port]`, defaulting to the PostgreSQL port
pub fn parse_endpoint(endpoint: &str) -> anyhow::Result<HostSpec> {
    let endpoint = endpoint.trim();
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in endpoint '{}'", endpoint))?;
            (host, port)
        }
        None => (endpoint, DEFAULT_PORT),
    };
    if host.is_empty() {
        bail!("endpoint '{}' has no host", endpoint);
    }
    Ok(HostSpec::new(host, Some(port)))
}
