use std::sync::Arc;

use pivot_core::{Connection, HostSpec, PivotError, Result, Topology};

use tokio::sync::watch;

use super::{TaskContext, TaskKind, TaskReport};
use crate::attempt::connect_and_validate;

/// Polls topology until a new writer shows up, then connects to it.
///
/// While an attempt is in flight the `attempting` flag is set. The sender is
/// dropped once the task has reported or stopped.
pub(crate) struct TopologyUpdateTask {
    ctx: TaskContext,
    prior_writer: Option<HostSpec>,
    attempting: watch::Sender<bool>,
}

impl TopologyUpdateTask {
    pub(crate) fn new(ctx: TaskContext, prior_writer: Option<HostSpec>) -> Self {
        let (attempting, _) = watch::channel(true);
        Self {
            ctx,
            prior_writer,
            attempting,
        }
    }

    /// Follow whether an attempt is in flight
    pub(crate) fn attempts(&self) -> watch::Receiver<bool> {
        self.attempting.subscribe()
    }

    pub(crate) async fn run(self) {
        let mut attempt = 0u32;
        loop {
            if self.ctx.is_done() {
                return;
            }
            attempt += 1;

            self.attempting.send_replace(true);
            let error = match self.attempt().await {
                Ok((host, connection, topology)) => {
                    tracing::info!(host = %host, attempt, "connected to new writer");
                    self.ctx
                        .deliver(TaskReport::Connected {
                            kind: TaskKind::TopologyUpdate,
                            host,
                            connection,
                            topology,
                        })
                        .await;
                    return;
                }
                Err(e) => e,
            };
            self.attempting.send_replace(false);
            tracing::debug!(attempt, error = %error, "no usable new writer yet");

            if self.ctx.config.attempts_exhausted(attempt) {
                self.ctx
                    .deliver(TaskReport::Exhausted {
                        kind: TaskKind::TopologyUpdate,
                        error,
                    })
                    .await;
                return;
            }
            if !self
                .ctx
                .pause(self.ctx.config.topology_refresh_interval())
                .await
            {
                return;
            }
        }
    }

    async fn attempt(&self) -> Result<(HostSpec, Arc<dyn Connection>, Topology)> {
        let topology = self.current_topology().await?;
        let writer = self.select_writer(&topology).ok_or_else(|| {
            PivotError::Topology(match (&self.prior_writer, topology.writer()) {
                (Some(prior), Some(writer)) if writer.is_same_host(prior) => {
                    format!("topology still reports {} as writer", prior)
                }
                _ => "topology reports no available writer".to_string(),
            })
        })?;

        let connection = connect_and_validate(
            self.ctx.provider.as_ref(),
            &self.ctx.protocol,
            &writer,
            &self.ctx.properties,
            self.ctx.config.attempt_timeout(),
        )
        .await?;
        Ok((writer, connection, topology))
    }

    /// Force a refresh, falling back to the last cached snapshot when the
    /// topology service is unavailable.
    async fn current_topology(&self) -> Result<Topology> {
        let service = &self.ctx.topology_service;
        let error = match tokio::time::timeout(
            self.ctx.config.attempt_timeout(),
            service.topology(true),
        )
        .await
        {
            Ok(Ok(topology)) => return Ok(topology),
            Ok(Err(e)) => e,
            Err(_) => PivotError::Topology("topology refresh timed out".into()),
        };

        match service.cached() {
            Some(cached) => {
                tracing::debug!(error = %error, "using cached topology");
                Ok(cached)
            }
            None => Err(match error {
                PivotError::Topology(_) => error,
                other => PivotError::Topology(other.to_string()),
            }),
        }
    }

    /// Pick the writer to connect to, if the topology names a usable one.
    ///
    /// A different host qualifies as soon as it is available. The prior
    /// writer's own host only qualifies when it was marked unavailable before
    /// and is reported available again.
    pub(crate) fn select_writer(&self, topology: &Topology) -> Option<HostSpec> {
        let writer = topology.writer().filter(|w| w.is_available())?;
        match &self.prior_writer {
            Some(prior) if writer.is_same_host(prior) && prior.is_available() => None,
            _ => Some(writer.clone()),
        }
    }
}
