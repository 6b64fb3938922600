//! Failover timing configuration

use std::time::Duration;

use pivot_core::{PivotError, Result};
use serde::{Deserialize, Serialize};

/// Timeouts, poll intervals and limits for writer and reader failover.
///
/// Durations are stored in milliseconds so the struct maps directly onto
/// configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Global deadline for one failover call
    failover_timeout_ms: u64,
    /// Pause between reconnect attempts to the last known writer
    reconnect_interval_ms: u64,
    /// Pause between topology polls while waiting for a new writer
    topology_refresh_interval_ms: u64,
    /// Budget for one connect plus validation attempt by a writer task
    attempt_timeout_ms: u64,
    /// Budget for one connect plus validation attempt to a reader
    reader_connect_timeout_ms: u64,
    /// Pause between full passes over the reader candidates
    reader_retry_interval_ms: u64,
    /// Number of reader candidates probed concurrently
    reader_parallelism: usize,
    /// Probe readers marked unavailable after the writer
    probe_unavailable_readers: bool,
    /// Cap on attempts per writer task and on reader passes
    max_task_attempts: Option<u32>,
}

impl FailoverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failover_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.failover_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reconnect_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reconnect_interval_ms = interval_ms;
        self
    }

    pub fn with_topology_refresh_interval_ms(mut self, interval_ms: u64) -> Self {
        self.topology_refresh_interval_ms = interval_ms;
        self
    }

    pub fn with_attempt_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.attempt_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reader_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.reader_connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_reader_retry_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reader_retry_interval_ms = interval_ms;
        self
    }

    pub fn with_reader_parallelism(mut self, parallelism: usize) -> Self {
        self.reader_parallelism = parallelism;
        self
    }

    pub fn with_probe_unavailable_readers(mut self, probe: bool) -> Self {
        self.probe_unavailable_readers = probe;
        self
    }

    pub fn with_max_task_attempts(mut self, attempts: u32) -> Self {
        self.max_task_attempts = Some(attempts);
        self
    }

    pub fn failover_timeout(&self) -> Duration {
        Duration::from_millis(self.failover_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn topology_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.topology_refresh_interval_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn reader_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_connect_timeout_ms)
    }

    pub fn reader_retry_interval(&self) -> Duration {
        Duration::from_millis(self.reader_retry_interval_ms)
    }

    pub fn reader_parallelism(&self) -> usize {
        self.reader_parallelism
    }

    pub fn probe_unavailable_readers(&self) -> bool {
        self.probe_unavailable_readers
    }

    pub fn max_task_attempts(&self) -> Option<u32> {
        self.max_task_attempts
    }

    /// Whether `attempts` has reached the configured cap
    pub(crate) fn attempts_exhausted(&self, attempts: u32) -> bool {
        self.max_task_attempts.is_some_and(|max| attempts >= max)
    }

    /// Reject configurations the handlers cannot honour.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("failover_timeout_ms", self.failover_timeout_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("topology_refresh_interval_ms", self.topology_refresh_interval_ms),
            ("attempt_timeout_ms", self.attempt_timeout_ms),
            ("reader_connect_timeout_ms", self.reader_connect_timeout_ms),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| *value == 0) {
            return Err(PivotError::Configuration(format!("{} must be greater than 0", name)));
        }
        if self.reader_parallelism == 0 {
            return Err(PivotError::Configuration(
                "reader_parallelism must be greater than 0".into(),
            ));
        }
        if self.max_task_attempts == Some(0) {
            return Err(PivotError::Configuration(
                "max_task_attempts must be greater than 0 when set".into(),
            ));
        }
        let shortest_poll = self
            .reconnect_interval_ms
            .min(self.topology_refresh_interval_ms);
        if self.attempt_timeout_ms >= shortest_poll {
            return Err(PivotError::Configuration(format!(
                "attempt_timeout_ms ({}) must be shorter than the poll intervals ({})",
                self.attempt_timeout_ms, shortest_poll
            )));
        }
        Ok(())
    }
}

impl Default for FailoverConfig {
    /// Defaults:
    /// - failover_timeout: 60 seconds
    /// - reconnect / topology refresh interval: 5 seconds
    /// - attempt_timeout: 3 seconds
    /// - reader_connect_timeout: 30 seconds
    /// - reader_retry_interval: 1 second
    /// - reader_parallelism: 2
    fn default() -> Self {
        Self {
            failover_timeout_ms: 60_000,
            reconnect_interval_ms: 5_000,
            topology_refresh_interval_ms: 5_000,
            attempt_timeout_ms: 3_000,
            reader_connect_timeout_ms: 30_000,
            reader_retry_interval_ms: 1_000,
            reader_parallelism: 2,
            probe_unavailable_readers: true,
            max_task_attempts: None,
        }
    }
}
