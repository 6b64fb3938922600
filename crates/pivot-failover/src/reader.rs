//! Reader failover
//!
//! Candidates are probed in priority tiers:
//!
//! 1. available readers that have not failed during this call, shuffled
//! 2. the writer, which can always serve reads
//! 3. readers marked unavailable or that already failed, shuffled
//! 4. the writer, when it is the host that failed
//!
//! Each tier is walked in chunks of `reader_parallelism` hosts probed
//! concurrently. A chunk never spans two tiers, so the writer is only probed
//! once every available reader has failed. Full passes repeat until a
//! connection validates, the deadline expires, or the pass limit is reached.


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pivot_connection::ConnectionProvider;
use pivot_core::{Connection, ConnectionProperties, HostSpec, PivotError, Result, Topology};
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::attempt::{close_quietly, connect_and_validate};
use crate::result::READER_FAILOVER_TASK;
use crate::{FailoverConfig, FailoverResult};

struct ProbeReport {
    rank: usize,
    host: HostSpec,
    result: Result<Arc<dyn Connection>>,
}

enum ChunkOutcome {
    Connected {
        host: HostSpec,
        connection: Arc<dyn Connection>,
    },
    Failed(Vec<(HostSpec, PivotError)>),
    TimedOut,
}

pub struct ReaderFailoverHandler {
    provider: Arc<dyn ConnectionProvider>,
    protocol: Arc<str>,
    properties: Arc<ConnectionProperties>,
    config: FailoverConfig,
}

impl ReaderFailoverHandler {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        protocol: impl Into<String>,
        properties: ConnectionProperties,
        config: FailoverConfig,
    ) -> Self {
        Self {
            provider,
            protocol: Arc::from(protocol.into()),
            properties: Arc::new(properties),
            config,
        }
    }

    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Find a connection that can serve reads.
    ///
    /// No host is known to have failed, so a successful result always reports
    /// `is_new_host`.
    pub async fn failover(&self, topology: &Topology) -> FailoverResult {
        self.failover_from(topology, None).await
    }

    /// Find a connection that can serve reads after `failed_host` was lost.
    ///
    /// The failed host is only tried as a last resort, and the result reports a
    /// new host whenever it resolves anywhere else.
    #[tracing::instrument(skip(self, topology, failed_host), fields(failed_host = ?failed_host.map(|h| h.to_string())))]
    pub async fn failover_from(
        &self,
        topology: &Topology,
        failed_host: Option<&HostSpec>,
    ) -> FailoverResult {
        let started = Instant::now();
        let deadline = started + self.config.failover_timeout();
        let mut failed: HashSet<HostSpec> = failed_host.into_iter().cloned().collect();
        let mut last_error: Option<PivotError> = None;
        let mut pass = 0u32;

        loop {
            pass += 1;
            let tiers = self.candidate_tiers(topology, &failed);
            if tiers.is_empty() {
                let error = last_error.unwrap_or_else(|| {
                    PivotError::Topology("topology has no hosts to fail over to".into())
                });
                return FailoverResult::failed(READER_FAILOVER_TASK, error, started.elapsed());
            }
            tracing::debug!(
                pass,
                tiers = tiers.len(),
                candidates = tiers.iter().map(Vec::len).sum::<usize>(),
                "probing reader candidates"
            );

            let parallelism = self.config.reader_parallelism().max(1);
            let mut rank_offset = 0;
            for chunk in tiers.iter().flat_map(|tier| tier.chunks(parallelism)) {
                match self.probe_chunk(chunk, rank_offset, deadline).await {
                    ChunkOutcome::Connected { host, connection } => {
                        let is_new_host = failed_host.is_none_or(|f| !f.is_same_host(&host));
                        tracing::info!(
                            host = %host,
                            pass,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "reader failover succeeded"
                        );
                        return FailoverResult::connected(
                            READER_FAILOVER_TASK,
                            host,
                            connection,
                            Some(topology.clone()),
                            is_new_host,
                            started.elapsed(),
                        );
                    }
                    ChunkOutcome::Failed(errors) => {
                        for (host, error) in errors {
                            tracing::debug!(host = %host, error = %error, "reader candidate failed");
                            last_error = Some(match last_error.take() {
                                Some(previous) => previous.more_specific(error),
                                None => error,
                            });
                            failed.insert(host);
                        }
                    }
                    ChunkOutcome::TimedOut => return self.timed_out(started),
                }
                rank_offset += chunk.len();
            }

            if self.config.attempts_exhausted(pass) {
                let error = last_error
                    .unwrap_or_else(|| PivotError::Connection("no reader candidate connected".into()));
                tracing::warn!(error = %error, passes = pass, "reader failover failed");
                return FailoverResult::failed(READER_FAILOVER_TASK, error, started.elapsed());
            }

            let resume = Instant::now() + self.config.reader_retry_interval();
            if resume >= deadline {
                tokio::time::sleep_until(deadline).await;
                return self.timed_out(started);
            }
            tokio::time::sleep_until(resume).await;
        }
    }

    fn timed_out(&self, started: Instant) -> FailoverResult {
        tracing::warn!(
            timeout_ms = self.config.failover_timeout().as_millis() as u64,
            "reader failover timed out"
        );
        FailoverResult::failed(
            READER_FAILOVER_TASK,
            PivotError::FailoverTimeout(self.config.failover_timeout()),
            started.elapsed(),
        )
    }

    /// Order the topology's hosts into probing tiers. Empty tiers are left out.
    pub(crate) fn candidate_tiers(
        &self,
        topology: &Topology,
        failed: &HashSet<HostSpec>,
    ) -> Vec<Vec<HostSpec>> {
        let mut rng = rand::thread_rng();
        let (mut fresh, mut stale): (Vec<HostSpec>, Vec<HostSpec>) = topology
            .readers()
            .cloned()
            .partition(|h| h.is_available() && !failed.contains(h));
        fresh.shuffle(&mut rng);
        stale.shuffle(&mut rng);

        let writer = topology.writer();
        let writer_failed = writer.is_some_and(|w| failed.contains(w));
        if !self.config.probe_unavailable_readers() {
            stale.clear();
        }

        let tiers = [
            fresh,
            writer.filter(|_| !writer_failed).cloned().into_iter().collect(),
            stale,
            writer.filter(|_| writer_failed).cloned().into_iter().collect(),
        ];
        tiers.into_iter().filter(|tier| !tier.is_empty()).collect()
    }

    /// Probe `chunk` concurrently. Within one scheduling tick the candidate
    /// with the lowest rank wins; every other connection is closed.
    async fn probe_chunk(
        &self,
        chunk: &[HostSpec],
        rank_offset: usize,
        deadline: Instant,
    ) -> ChunkOutcome {
        let (tx, mut rx) = mpsc::channel(chunk.len());
        for (idx, host) in chunk.iter().enumerate() {
            let probe = probe(
                self.provider.clone(),
                self.protocol.clone(),
                self.properties.clone(),
                host.clone(),
                rank_offset + idx,
                self.config.reader_connect_timeout(),
                tx.clone(),
            );
            tokio::spawn(probe.instrument(tracing::debug_span!("reader_probe", host = %host)));
        }
        drop(tx);

        let mut failures = Vec::new();
        let outcome = loop {
            tokio::select! {
                biased;
                report = rx.recv() => match report {
                    Some(ProbeReport { rank, host, result: Ok(connection) }) => {
                        break Self::lowest_rank(rank, host, connection, &mut rx).await;
                    }
                    Some(ProbeReport { host, result: Err(error), .. }) => failures.push((host, error)),
                    None => break ChunkOutcome::Failed(std::mem::take(&mut failures)),
                },
                _ = tokio::time::sleep_until(deadline) => break ChunkOutcome::TimedOut,
            }
        };

        rx.close();
        while let Ok(report) = rx.try_recv() {
            if let Ok(connection) = report.result {
                close_quietly(&connection).await;
            }
        }
        outcome
    }

    async fn lowest_rank(
        rank: usize,
        host: HostSpec,
        connection: Arc<dyn Connection>,
        rx: &mut mpsc::Receiver<ProbeReport>,
    ) -> ChunkOutcome {
        tokio::task::yield_now().await;

        let mut best = (rank, host, connection);
        while let Ok(report) = rx.try_recv() {
            let Ok(connection) = report.result else {
                continue;
            };
            if report.rank < best.0 {
                let (_, _, loser) = std::mem::replace(&mut best, (report.rank, report.host, connection));
                close_quietly(&loser).await;
            } else {
                close_quietly(&connection).await;
            }
        }
        let (_, host, connection) = best;
        ChunkOutcome::Connected { host, connection }
    }
}

/// One detached connect-and-validate attempt. A connection that arrives after
/// the chunk settled is closed here.
async fn probe(
    provider: Arc<dyn ConnectionProvider>,
    protocol: Arc<str>,
    properties: Arc<ConnectionProperties>,
    host: HostSpec,
    rank: usize,
    timeout: Duration,
    reports: mpsc::Sender<ProbeReport>,
) {
    let result =
        connect_and_validate(provider.as_ref(), &protocol, &host, &properties, timeout).await;
    let report = ProbeReport { rank, host, result };
    if let Err(mpsc::error::SendError(report)) = reports.send(report).await {
        if let Ok(connection) = report.result {
            tracing::debug!(host = %report.host, "closing late reader connection");
            close_quietly(&connection).await;
        }
    }
}
