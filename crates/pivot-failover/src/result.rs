//! Failover outcome record

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use pivot_core::{Connection, HostSpec, PivotError, Topology};

/// Produced when the reconnect to the last known writer won the race
pub const RECONNECT_TASK: &str = "reconnect";
/// Produced when a newly elected writer was found through topology
pub const TOPOLOGY_UPDATE_TASK: &str = "topologyUpdate";
/// Produced by the reader handler
pub const READER_FAILOVER_TASK: &str = "readerFailover";
/// Produced by the writer handler itself when no task succeeded
pub const WRITER_FAILOVER_TASK: &str = "writerFailover";

/// Outcome of one failover call.
///
/// A result is connected exactly when it holds a connection, and a connected
/// result never carries an error.
pub struct FailoverResult {
    connected: bool,
    is_new_host: bool,
    host: Option<HostSpec>,
    topology: Option<Topology>,
    connection: Option<Arc<dyn Connection>>,
    task_name: &'static str,
    error: Option<PivotError>,
    elapsed: Duration,
}

impl FailoverResult {
    pub fn connected(
        task_name: &'static str,
        host: HostSpec,
        connection: Arc<dyn Connection>,
        topology: Option<Topology>,
        is_new_host: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            connected: true,
            is_new_host,
            host: Some(host),
            topology,
            connection: Some(connection),
            task_name,
            error: None,
            elapsed,
        }
    }

    pub fn failed(task_name: &'static str, error: PivotError, elapsed: Duration) -> Self {
        Self {
            connected: false,
            is_new_host: false,
            host: None,
            topology: None,
            connection: None,
            task_name,
            error: Some(error),
            elapsed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the resolved host differs from the host that triggered failover
    pub fn is_new_host(&self) -> bool {
        self.is_new_host
    }

    pub fn host(&self) -> Option<&HostSpec> {
        self.host.as_ref()
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    /// Which task produced this result
    pub fn task_name(&self) -> &'static str {
        self.task_name
    }

    pub fn error(&self) -> Option<&PivotError> {
        self.error.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Take ownership of the connection
    pub fn into_connection(self) -> Option<Arc<dyn Connection>> {
        self.connection
    }
}

impl fmt::Debug for FailoverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverResult")
            .field("connected", &self.connected)
            .field("is_new_host", &self.is_new_host)
            .field("host", &self.host.as_ref().map(ToString::to_string))
            .field("task_name", &self.task_name)
            .field("error", &self.error)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockConnection;

    #[test]
    fn test_connected_result_holds_connection() {
        let conn: Arc<dyn Connection> = Arc::new(MockConnection::new("db-1"));
        let result = FailoverResult::connected(
            RECONNECT_TASK,
            HostSpec::writer("db-1", 5432),
            conn,
            None,
            false,
            Duration::from_millis(40),
        );

        assert!(result.is_connected());
        assert!(result.connection().is_some());
        assert!(result.error().is_none());
        assert_eq!(result.task_name(), "reconnect");
    }

    #[test]
    fn test_failed_result_has_no_connection() {
        let result = FailoverResult::failed(
            WRITER_FAILOVER_TASK,
            PivotError::FailoverTimeout(Duration::from_secs(60)),
            Duration::from_secs(60),
        );

        assert!(!result.is_connected());
        assert!(result.connection().is_none());
        assert!(result.topology().is_none());
        assert!(matches!(result.error(), Some(PivotError::FailoverTimeout(_))));
        assert!(result.into_connection().is_none());
    }

    #[test]
    fn test_debug_omits_connection() {
        let result = FailoverResult::failed(
            READER_FAILOVER_TASK,
            PivotError::Connection("refused".into()),
            Duration::ZERO,
        );
        let rendered = format!("{:?}", result);
        assert!(rendered.contains("readerFailover"));
        assert!(rendered.contains("refused"));
    }
}
