//! Cluster member descriptors

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role a host plays in the cluster at the time of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    /// Accepts writes
    Writer,
    /// Serves read-only traffic
    Reader,
    #[default]
    Unknown,
}

/// Whether a host is believed to accept connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostAvailability {
    #[default]
    Available,
    Unavailable,
}

/// Immutable description of one cluster member.
///
/// Two specs are equal when they name the same host and port. Role and
/// availability are deliberately left out of equality and hashing because the
/// same host changes role between snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    host: String,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    role: HostRole,
    #[serde(default)]
    availability: HostAvailability,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl HostSpec {
    /// Create a spec with unknown role that is assumed available
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            role: HostRole::Unknown,
            availability: HostAvailability::Available,
            last_updated: None,
        }
    }

    /// Shorthand for an available writer
    pub fn writer(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, Some(port)).with_role(HostRole::Writer)
    }

    /// Shorthand for an available reader
    pub fn reader(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, Some(port)).with_role(HostRole::Reader)
    }

    pub fn with_role(mut self, role: HostRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_availability(mut self, availability: HostAvailability) -> Self {
        self.availability = availability;
        self
    }

    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn role(&self) -> HostRole {
        self.role
    }

    pub fn availability(&self) -> HostAvailability {
        self.availability
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_writer(&self) -> bool {
        self.role == HostRole::Writer
    }

    pub fn is_available(&self) -> bool {
        self.availability == HostAvailability::Available
    }

    /// Compare host identity (name and port), ignoring role and availability.
    pub fn is_same_host(&self, other: &HostSpec) -> bool {
        self.host == other.host && self.port == other.port
    }

    /// Host portion of a connection URL: `host:port/`, or `host/` without a port.
    pub fn url(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}/", self.host, port),
            None => format!("{}/", self.host),
        }
    }
}

impl PartialEq for HostSpec {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_host(other)
    }
}

impl Eq for HostSpec {}

impl Hash for HostSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}
