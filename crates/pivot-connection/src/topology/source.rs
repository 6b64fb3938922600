use async_trait::async_trait;
use parking_lot::RwLock;
use pivot_core::{Result, Topology};

/// Fetches a fresh topology snapshot from the cluster
#[async_trait]
pub trait TopologySource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Topology>;
}

/// A topology that only changes when told to.
///
/// Used for clusters described by configuration rather than discovered.
#[derive(Default)]
pub struct StaticTopologySource {
    topology: RwLock<Topology>,
}

impl StaticTopologySource {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: RwLock::new(topology),
        }
    }

    /// Replace the snapshot returned by subsequent fetches
    pub fn set(&self, topology: Topology) {
        *self.topology.write() = topology;
    }
}

#[async_trait]
impl TopologySource for StaticTopologySource {
    async fn fetch(&self) -> Result<Topology> {
        Ok(self.topology.read().clone())
    }
}
