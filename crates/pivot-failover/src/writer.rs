//! Writer failover
//!
//! Two tasks race under one deadline: a reconnect to the writer that was lost
//! and a topology watch for a newly elected writer. The first validated
//! connection wins, with one exception: when the reconnect succeeds while the
//! topology watch has an attempt in flight, the handler waits for that attempt
//! to finish and prefers the topology watch if it connects. The old writer may
//! have been demoted even though it still accepts connections.
//!
//! Dropping the failover future cancels both tasks.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use pivot_connection::{ConnectionProvider, TopologyService};
use pivot_core::{ConnectionProperties, HostSpec, PivotError, Topology};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::result::WRITER_FAILOVER_TASK;
use crate::task::{ReconnectTask, TaskContext, TaskKind, TaskReport, TopologyUpdateTask};
use crate::{FailoverConfig, FailoverResult};

/// How a race ended before the result is built
enum RaceOutcome {
    Won(TaskReport),
    AllFailed(Vec<(TaskKind, PivotError)>),
    TimedOut,
}

pub struct WriterFailoverHandler {
    provider: Arc<dyn ConnectionProvider>,
    topology_service: Arc<dyn TopologyService>,
    protocol: Arc<str>,
    properties: Arc<ConnectionProperties>,
    config: FailoverConfig,
}

impl WriterFailoverHandler {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        topology_service: Arc<dyn TopologyService>,
        protocol: impl Into<String>,
        properties: ConnectionProperties,
        config: FailoverConfig,
    ) -> Self {
        Self {
            provider,
            topology_service,
            protocol: Arc::from(protocol.into()),
            properties: Arc::new(properties),
            config,
        }
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Find a writer connection after the connection to the writer in
    /// `prior_topology` was lost.
    ///
    /// Never fails: every outcome, including a timeout, is returned as a
    /// `FailoverResult`. Connections opened by the losing task are closed.
    #[tracing::instrument(
        skip(self, prior_topology),
        fields(prior_writer = ?prior_topology.writer().map(|w| w.to_string()))
    )]
    pub async fn failover(&self, prior_topology: &Topology) -> FailoverResult {
        let started = Instant::now();
        let deadline = started + self.config.failover_timeout();
        let prior_writer = prior_topology.writer().cloned();

        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(2);
        let ctx = TaskContext {
            provider: self.provider.clone(),
            topology_service: self.topology_service.clone(),
            protocol: self.protocol.clone(),
            properties: self.properties.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            deadline,
            reports: tx,
        };
        let cancel_on_drop = cancel.drop_guard();

        let mut running = 1;
        if let Some(writer) = &prior_writer {
            let task = ReconnectTask::new(ctx.clone(), writer.clone(), prior_topology.clone());
            tokio::spawn(
                task.run()
                    .instrument(tracing::debug_span!("reconnect", host = %writer)),
            );
            running += 1;
        } else {
            tracing::debug!("prior topology has no writer, waiting for topology only");
        }
        let watch = TopologyUpdateTask::new(ctx, prior_writer.clone());
        let watch_attempts = watch.attempts();
        tokio::spawn(watch.run().instrument(tracing::debug_span!("topology_update")));

        let outcome = Self::race(&mut rx, running, deadline).await;

        let result = match outcome {
            RaceOutcome::Won(first) => {
                let winner = Self::settle_tie(first, &mut rx, watch_attempts, deadline).await;
                self.connected_result(winner, prior_writer.as_ref(), started)
            }
            RaceOutcome::AllFailed(errors) => {
                let error = errors
                    .into_iter()
                    .map(|(_, error)| error)
                    .reduce(PivotError::more_specific)
                    .unwrap_or_else(|| PivotError::Other("failover tasks ended without a report".into()));
                tracing::warn!(error = %error, "writer failover failed");
                FailoverResult::failed(WRITER_FAILOVER_TASK, error, started.elapsed())
            }
            RaceOutcome::TimedOut => {
                tracing::warn!(
                    timeout_ms = self.config.failover_timeout().as_millis() as u64,
                    "writer failover timed out"
                );
                FailoverResult::failed(
                    WRITER_FAILOVER_TASK,
                    PivotError::FailoverTimeout(self.config.failover_timeout()),
                    started.elapsed(),
                )
            }
        };

        drop(cancel_on_drop);
        rx.close();
        while let Ok(report) = rx.try_recv() {
            report.discard().await;
        }
        result
    }

    /// Wait for the first success, for every task to give up, or for the deadline.
    async fn race(
        rx: &mut mpsc::Receiver<TaskReport>,
        mut running: usize,
        deadline: Instant,
    ) -> RaceOutcome {
        let mut errors = Vec::new();
        loop {
            tokio::select! {
                biased;
                report = rx.recv() => match report {
                    Some(report @ TaskReport::Connected { .. }) => return RaceOutcome::Won(report),
                    Some(TaskReport::Exhausted { kind, error }) => {
                        tracing::debug!(task = kind.name(), error = %error, "task exhausted its attempts");
                        errors.push((kind, error));
                        running -= 1;
                        if running == 0 {
                            return RaceOutcome::AllFailed(errors);
                        }
                    }
                    // Tasks stop silently at the deadline
                    None if Instant::now() >= deadline => return RaceOutcome::TimedOut,
                    None => return RaceOutcome::AllFailed(errors),
                },
                _ = tokio::time::sleep_until(deadline) => return RaceOutcome::TimedOut,
            }
        }
    }

    /// Prefer the topology watch over a reconnect that won while the watch
    /// still had an attempt in flight.
    ///
    /// The wait ends when that attempt fails, when the watch reports or stops,
    /// or at the deadline. Every report left in the channel is then compared
    /// against the first one.
    async fn settle_tie(
        first: TaskReport,
        rx: &mut mpsc::Receiver<TaskReport>,
        mut watch_attempts: watch::Receiver<bool>,
        deadline: Instant,
    ) -> TaskReport {
        let reconnect_won = matches!(
            first,
            TaskReport::Connected {
                kind: TaskKind::Reconnect,
                ..
            }
        );
        if reconnect_won {
            tokio::select! {
                biased;
                // A closed channel means the watch has reported or stopped
                _ = watch_attempts.wait_for(|attempting| !*attempting) => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }

        let mut winner = first;
        while let Ok(report) = rx.try_recv() {
            let report_wins = matches!(
                (&report, &winner),
                (
                    TaskReport::Connected {
                        kind: TaskKind::TopologyUpdate,
                        ..
                    },
                    TaskReport::Connected {
                        kind: TaskKind::Reconnect,
                        ..
                    }
                )
            );
            if report_wins {
                tracing::debug!("new writer found while reconnect was settling, preferring new writer");
                std::mem::replace(&mut winner, report).discard().await;
            } else {
                report.discard().await;
            }
        }
        winner
    }

    fn connected_result(
        &self,
        winner: TaskReport,
        prior_writer: Option<&HostSpec>,
        started: Instant,
    ) -> FailoverResult {
        let TaskReport::Connected {
            kind,
            host,
            connection,
            topology,
        } = winner
        else {
            return FailoverResult::failed(
                WRITER_FAILOVER_TASK,
                PivotError::Other("winning report carried no connection".into()),
                started.elapsed(),
            );
        };

        let is_new_host = match kind {
            TaskKind::Reconnect => false,
            TaskKind::TopologyUpdate => prior_writer.is_none_or(|prior| !prior.is_same_host(&host)),
        };
        tracing::info!(
            task = kind.name(),
            host = %host,
            is_new_host,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "writer failover succeeded"
        );
        FailoverResult::connected(
            kind.name(),
            host,
            connection,
            Some(topology),
            is_new_host,
            started.elapsed(),
        )
    }
}
