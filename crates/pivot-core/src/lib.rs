//! Pivot Core - Core abstractions for cluster-aware database connections
//!
//! This crate provides the fundamental traits and types that all other
//! Pivot crates depend on. It defines:
//!
//! - `HostSpec` / `Topology` - Cluster member descriptors and consistent snapshots
//! - `Connection` - Trait for an open database connection handle
//! - `DatabaseDriver` - Trait for the network connector that opens connections
//! - `ConnectionProperties` - Typed connection options with a passthrough map
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod driver;
mod error;
mod host;
mod properties;
mod topology;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use host::*;
pub use properties::*;
pub use topology::*;
pub use types::*;
