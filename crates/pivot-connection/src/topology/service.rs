use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use pivot_core::{PivotError, Result, Topology};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::TopologySource;

/// Supplies the current cluster topology
#[async_trait]
pub trait TopologyService: Send + Sync + 'static {
    /// Return the topology, bypassing any cache when `force_refresh` is set.
    async fn topology(&self, force_refresh: bool) -> Result<Topology>;

    /// The last known snapshot, regardless of age
    fn cached(&self) -> Option<Topology>;
}

#[async_trait]
impl<T: TopologyService> TopologyService for Arc<T> {
    async fn topology(&self, force_refresh: bool) -> Result<Topology> {
        (**self).topology(force_refresh).await
    }

    fn cached(&self) -> Option<Topology> {
        (**self).cached()
    }
}

struct CacheEntry {
    topology: Topology,
    fetched_at: Instant,
}

/// Outcome of the most recent completed refresh, shared with callers that
/// waited on it
enum LastRefresh {
    Fetched,
    Failed(String),
}

/// Topology service backed by a `TopologySource` with a time-based cache.
///
/// Refreshes are single-flight: a caller that finds a refresh already in
/// progress waits for it and reuses its outcome instead of fetching again.
pub struct CachedTopologyService {
    source: Arc<dyn TopologySource>,
    refresh_rate: Duration,
    cache: RwLock<Option<CacheEntry>>,
    last_refresh: RwLock<Option<LastRefresh>>,
    refresh_gate: Mutex<()>,
    /// Incremented after every completed refresh
    generation: AtomicU64,
}

impl CachedTopologyService {
    pub fn new(source: Arc<dyn TopologySource>, refresh_rate: Duration) -> Self {
        Self {
            source,
            refresh_rate,
            cache: RwLock::new(None),
            last_refresh: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Seed the cache with a known snapshot
    pub fn with_initial(self, topology: Topology) -> Self {
        self.store(topology);
        self
    }

    pub fn refresh_rate(&self) -> Duration {
        self.refresh_rate
    }

    /// Number of refreshes completed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn fresh(&self) -> Option<Topology> {
        let cache = self.cache.read();
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.refresh_rate)
            .map(|entry| entry.topology.clone())
    }

    fn store(&self, topology: Topology) {
        *self.cache.write() = Some(CacheEntry {
            topology,
            fetched_at: Instant::now(),
        });
    }

    /// Outcome of a refresh that completed while this caller was waiting
    fn shared_outcome(&self) -> Option<Result<Topology>> {
        match self.last_refresh.read().as_ref()? {
            LastRefresh::Fetched => self.cached().map(Ok),
            LastRefresh::Failed(msg) => Some(Err(PivotError::Topology(msg.clone()))),
        }
    }

    async fn refresh(&self) -> Result<Topology> {
        let observed = self.generation.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            if let Some(outcome) = self.shared_outcome() {
                tracing::trace!("reusing topology from concurrent refresh");
                return outcome;
            }
        }

        let result = self.source.fetch().await;
        match &result {
            Ok(topology) => {
                self.store(topology.clone());
                *self.last_refresh.write() = Some(LastRefresh::Fetched);
                tracing::debug!(hosts = topology.len(), "topology refreshed");
            }
            Err(e) => {
                *self.last_refresh.write() = Some(LastRefresh::Failed(e.to_string()));
                tracing::warn!(error = %e, "topology refresh failed");
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        result.map_err(|e| match e {
            PivotError::Topology(_) => e,
            other => PivotError::Topology(other.to_string()),
        })
    }
}

#[async_trait]
impl TopologyService for CachedTopologyService {
    #[tracing::instrument(skip(self))]
    async fn topology(&self, force_refresh: bool) -> Result<Topology> {
        if !force_refresh {
            if let Some(topology) = self.fresh() {
                return Ok(topology);
            }
        }
        self.refresh().await
    }

    fn cached(&self) -> Option<Topology> {
        self.cache.read().as_ref().map(|entry| entry.topology.clone())
    }
}
