//! Cluster topology supply
//!
//! A `TopologySource` knows how to ask the cluster for its members. The
//! `CachedTopologyService` sits in front of a source, serves recent snapshots
//! from memory and coalesces concurrent refreshes into a single fetch.

mod query;
mod service;
mod source;


pub use query::{QueryTopologySource, TopologyQuery};
pub use service::{CachedTopologyService, TopologyService};
pub use source::{StaticTopologySource, TopologySource};
