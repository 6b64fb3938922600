//! Writer failover tasks
//!
//! Each task runs detached on the runtime and reports at most once through the
//! handler's channel. A task stops without reporting once it is cancelled or
//! its deadline passes. Any connection a task opens after its handler stopped
//! listening is closed by the task itself.

mod reconnect;
mod topology_update;


use std::sync::Arc;
use std::time::Duration;

use pivot_connection::{ConnectionProvider, TopologyService};
use pivot_core::{Connection, ConnectionProperties, HostSpec, PivotError, Topology};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::FailoverConfig;
use crate::attempt::close_quietly;
use crate::result::{RECONNECT_TASK, TOPOLOGY_UPDATE_TASK};

pub(crate) use reconnect::ReconnectTask;
pub(crate) use topology_update::TopologyUpdateTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Reconnect,
    TopologyUpdate,
}

impl TaskKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            TaskKind::Reconnect => RECONNECT_TASK,
            TaskKind::TopologyUpdate => TOPOLOGY_UPDATE_TASK,
        }
    }
}

pub(crate) enum TaskReport {
    Connected {
        kind: TaskKind,
        host: HostSpec,
        connection: Arc<dyn Connection>,
        topology: Topology,
    },
    Exhausted {
        kind: TaskKind,
        error: PivotError,
    },
}

impl TaskReport {
    /// Close the connection carried by a report nobody will adopt
    pub(crate) async fn discard(self) {
        if let TaskReport::Connected {
            kind,
            host,
            connection,
            ..
        } = self
        {
            tracing::debug!(task = kind.name(), host = %host, "closing connection from losing task");
            close_quietly(&connection).await;
        }
    }
}

/// Everything a writer task shares with its sibling and its handler
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) topology_service: Arc<dyn TopologyService>,
    pub(crate) protocol: Arc<str>,
    pub(crate) properties: Arc<ConnectionProperties>,
    pub(crate) config: FailoverConfig,
    pub(crate) cancel: CancellationToken,
    /// Same deadline the handler waits on
    pub(crate) deadline: Instant,
    pub(crate) reports: mpsc::Sender<TaskReport>,
}

impl TaskContext {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task should stop before starting another attempt
    pub(crate) fn is_done(&self) -> bool {
        self.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Hand a report to the handler, closing its connection if the handler has
    /// already settled.
    pub(crate) async fn deliver(&self, report: TaskReport) {
        if self.is_cancelled() {
            report.discard().await;
            return;
        }
        if let Err(mpsc::error::SendError(report)) = self.reports.send(report).await {
            report.discard().await;
        }
    }

    /// Sleep between attempts. Returns `false` when cancelled or when the
    /// deadline passes during the wait.
    pub(crate) async fn pause(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}
