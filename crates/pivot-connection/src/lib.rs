//! Pivot Connection - Opening, validating and locating cluster connections
//!
//! This crate wraps the network connector behind a `ConnectionProvider`,
//! checks that opened connections are live, and supplies cluster topology
//! through a cached, single-flight `TopologyService`.

pub mod health;
mod provider;
pub mod topology;

pub use health::{PingError, PingResult, ping_connection, validate_connection};
pub use provider::{ConnectionProvider, DriverConnectionProvider};
pub use topology::{
    CachedTopologyService, QueryTopologySource, StaticTopologySource, TopologyQuery,
    TopologyService, TopologySource,
};
