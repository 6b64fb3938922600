use std::sync::Arc;

use pivot_core::{Connection, HostSpec, PivotError, Result, Topology};

use super::{TaskContext, TaskKind, TaskReport};
use crate::attempt::{close_quietly, connect_and_validate};

/// Keeps reconnecting to the last known writer.
///
/// A reconnect only counts once a forced topology refresh still lists the host
/// as writer. A host that accepts connections after being demoted, or while the
/// cluster reports no writer at all, is dropped and retried.
pub(crate) struct ReconnectTask {
    ctx: TaskContext,
    target: HostSpec,
    prior_topology: Topology,
}

impl ReconnectTask {
    pub(crate) fn new(ctx: TaskContext, target: HostSpec, prior_topology: Topology) -> Self {
        Self {
            ctx,
            target,
            prior_topology,
        }
    }

    pub(crate) async fn run(self) {
        let mut attempt = 0u32;
        loop {
            if self.ctx.is_done() {
                return;
            }
            attempt += 1;

            let error = match self.attempt().await {
                Ok((connection, topology)) => {
                    tracing::info!(host = %self.target, attempt, "reconnected to writer");
                    self.ctx
                        .deliver(TaskReport::Connected {
                            kind: TaskKind::Reconnect,
                            host: self.target.clone(),
                            connection,
                            topology,
                        })
                        .await;
                    return;
                }
                Err(e) => e,
            };
            tracing::debug!(host = %self.target, attempt, error = %error, "reconnect attempt failed");

            if self.ctx.config.attempts_exhausted(attempt) {
                self.ctx
                    .deliver(TaskReport::Exhausted {
                        kind: TaskKind::Reconnect,
                        error,
                    })
                    .await;
                return;
            }
            if !self.ctx.pause(self.ctx.config.reconnect_interval()).await {
                return;
            }
        }
    }

    async fn attempt(&self) -> Result<(Arc<dyn Connection>, Topology)> {
        let connection = connect_and_validate(
            self.ctx.provider.as_ref(),
            &self.ctx.protocol,
            &self.target,
            &self.ctx.properties,
            self.ctx.config.attempt_timeout(),
        )
        .await?;

        match self.confirm_writer().await {
            Ok(topology) => Ok((connection, topology)),
            Err(e) => {
                close_quietly(&connection).await;
                Err(e)
            }
        }
    }

    /// Check that the refreshed topology still names the target as writer.
    /// A snapshot without a writer is left for the topology watch to resolve.
    ///
    /// A failed refresh is not a reason to reject the connection; the prior
    /// snapshot is kept instead.
    async fn confirm_writer(&self) -> Result<Topology> {
        let refreshed = tokio::time::timeout(
            self.ctx.config.attempt_timeout(),
            self.ctx.topology_service.topology(true),
        )
        .await;

        let topology = match refreshed {
            Ok(Ok(topology)) => topology,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "topology refresh failed, keeping reconnect");
                return Ok(self.prior_topology.clone());
            }
            Err(_) => {
                tracing::debug!("topology refresh timed out, keeping reconnect");
                return Ok(self.prior_topology.clone());
            }
        };

        match topology.find(&self.target) {
            Some(host) if host.is_writer() => Ok(topology),
            _ => Err(PivotError::Topology(match topology.writer() {
                Some(writer) => format!("{} was demoted, {} is now the writer", self.target, writer),
                None => format!("topology no longer lists {} as writer", self.target),
            })),
        }
    }
}
