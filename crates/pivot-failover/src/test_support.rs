//! Scripted collaborators for failover tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pivot_connection::{CachedTopologyService, ConnectionProvider, TopologySource};
use pivot_core::{
    Connection, ConnectionProperties, HostSpec, PivotError, QueryResult, Result, Topology,
};

/// What a scripted host does with one connect call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Accept,
    Refuse,
    /// The handshake succeeds but the first query fails
    FailValidation,
}

pub(crate) struct MockConnection {
    host: String,
    closed: AtomicBool,
    fail_validation: bool,
}

impl MockConnection {
    pub(crate) fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            closed: AtomicBool::new(false),
            fail_validation: false,
        }
    }

    fn failing_validation(host: &str) -> Self {
        Self {
            fail_validation: true,
            ..Self::new(host)
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(PivotError::Connection("connection closed".into()));
        }
        if self.fail_validation {
            return Err(PivotError::Query(format!("{} is not accepting queries", self.host)));
        }
        Ok(QueryResult::empty())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Whether `conn` is the same allocation as `mock`
pub(crate) fn same_connection(conn: &Arc<dyn Connection>, mock: &Arc<MockConnection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(conn), Arc::as_ptr(mock))
}

#[derive(Default)]
struct HostScript {
    outcomes: Vec<Outcome>,
    delay: Duration,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Provider whose hosts follow a per-host script of outcomes.
///
/// The n-th connect to a host uses the n-th scripted outcome; the last outcome
/// repeats. Unscripted hosts refuse.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    scripts: Mutex<HashMap<String, HostScript>>,
    connects: Mutex<HashMap<String, u32>>,
    opened: Mutex<Vec<Arc<MockConnection>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, host: &str, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.scripts
            .lock()
            .entry(host.to_string())
            .or_default()
            .outcomes = outcomes.into_iter().collect();
        self
    }

    /// Delay every connect to `host` by `delay`
    pub(crate) fn delay(self, host: &str, delay: Duration) -> Self {
        self.scripts.lock().entry(host.to_string()).or_default().delay = delay;
        self
    }

    pub(crate) fn connects(&self, host: &str) -> u32 {
        self.connects.lock().get(host).copied().unwrap_or(0)
    }

    /// Connections handed out for `host`, in order
    pub(crate) fn opened(&self, host: &str) -> Vec<Arc<MockConnection>> {
        self.opened
            .lock()
            .iter()
            .filter(|c| c.host() == host)
            .cloned()
            .collect()
    }

    pub(crate) fn all_opened(&self) -> Vec<Arc<MockConnection>> {
        self.opened.lock().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, host: &str) -> (Outcome, Duration) {
        let attempt = {
            let mut connects = self.connects.lock();
            let count = connects.entry(host.to_string()).or_insert(0);
            *count += 1;
            *count as usize - 1
        };
        let scripts = self.scripts.lock();
        match scripts.get(host) {
            Some(script) => {
                let outcome = script
                    .outcomes
                    .get(attempt)
                    .or(script.outcomes.last())
                    .copied()
                    .unwrap_or(Outcome::Refuse);
                (outcome, script.delay)
            }
            None => (Outcome::Refuse, Duration::ZERO),
        }
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn connect(
        &self,
        _protocol: &str,
        host: &HostSpec,
        _properties: &ConnectionProperties,
    ) -> Result<Arc<dyn Connection>> {
        let (outcome, delay) = self.next_step(host.host());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let conn = match outcome {
            Outcome::Refuse => {
                return Err(PivotError::Connection(format!("{} refused connection", host)));
            }
            Outcome::Accept => Arc::new(MockConnection::new(host.host())),
            Outcome::FailValidation => Arc::new(MockConnection::failing_validation(host.host())),
        };
        self.opened.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Topology source that replays a script of snapshots and failures.
///
/// The n-th fetch returns the n-th entry; the last entry repeats.
pub(crate) struct ScriptedTopologySource {
    script: Vec<std::result::Result<Topology, String>>,
    fetches: AtomicU32,
}

impl ScriptedTopologySource {
    pub(crate) fn new(script: Vec<std::result::Result<Topology, String>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            fetches: AtomicU32::new(0),
        })
    }

    pub(crate) fn fixed(topology: Topology) -> Arc<Self> {
        Self::new(vec![Ok(topology)])
    }

    pub(crate) fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TopologySource for ScriptedTopologySource {
    async fn fetch(&self) -> Result<Topology> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) as usize;
        let entry = self.script.get(n).or(self.script.last());
        match entry {
            Some(Ok(topology)) => Ok(topology.clone()),
            Some(Err(msg)) => Err(PivotError::Topology(msg.clone())),
            None => Err(PivotError::Topology("no topology scripted".into())),
        }
    }
}

/// Wrap a source in an uncached topology service
pub(crate) fn service(source: Arc<ScriptedTopologySource>) -> Arc<CachedTopologyService> {
    Arc::new(CachedTopologyService::new(source, Duration::ZERO))
}

pub(crate) fn topology(hosts: Vec<HostSpec>) -> Topology {
    Topology::new(hosts).unwrap()
}
