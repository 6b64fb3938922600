//! Subcommand handlers

use std::future::Future;

use anyhow::{Context, bail};
use pivot_core::{HostRole, HostSpec, Topology};
use pivot_failover::FailoverResult;

use crate::cluster::Cluster;
use crate::config::{PivotConfig, parse_endpoint};
use crate::output;

pub async fn topology(cluster: &Cluster, json: bool) -> anyhow::Result<()> {
    let topology = cluster.topology().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&topology)?);
    } else {
        println!("{}", output::topology_table(&topology));
    }
    Ok(())
}

pub async fn writer_failover(cluster: &Cluster, lost_writer: Option<&str>) -> anyhow::Result<bool> {
    let mut prior = cluster.topology().await?;
    if let Some(endpoint) = lost_writer {
        prior = with_writer(&prior, &parse_endpoint(endpoint)?)?;
    }
    tracing::info!(
        prior_writer = ?prior.writer().map(|w| w.to_string()),
        "starting writer failover"
    );

    let handler = cluster.writer_handler();
    let result = interruptible(handler.failover(&prior)).await?;
    report(result).await
}

pub async fn reader_failover(cluster: &Cluster, failed_host: Option<&str>) -> anyhow::Result<bool> {
    let topology = cluster.topology().await?;
    let failed = failed_host.map(parse_endpoint).transpose()?;

    let handler = cluster.reader_handler();
    let result = interruptible(handler.failover_from(&topology, failed.as_ref())).await?;
    report(result).await
}

pub fn check_config(config: &PivotConfig) -> anyhow::Result<()> {
    config.validate()?;
    let mut shown = config.clone();
    if shown.cluster.password.is_some() {
        shown.cluster.password = Some("<redacted>".into());
    }
    println!("{}", toml::to_string_pretty(&shown).context("failed to render configuration")?);
    println!("configuration is valid");
    Ok(())
}

/// Print the outcome and release the connection; this tool only probes.
async fn report(result: FailoverResult) -> anyhow::Result<bool> {
    println!("{}", output::result_table(&result));
    let connected = result.is_connected();
    if let Some(conn) = result.into_connection() {
        conn.close().await.context("failed to close failover connection")?;
    }
    Ok(connected)
}

async fn interruptible<F: Future<Output = FailoverResult>>(failover: F) -> anyhow::Result<FailoverResult> {
    tokio::select! {
        result = failover => Ok(result),
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    }
}

/// Rewrite a snapshot so `writer` is its writer, demoting the current one
fn with_writer(topology: &Topology, writer: &HostSpec) -> anyhow::Result<Topology> {
    if !topology.contains(writer) {
        bail!("{} is not a member of the cluster", writer);
    }
    let hosts = topology
        .hosts()
        .iter()
        .map(|h| match (h.is_same_host(writer), h.is_writer()) {
            (true, _) => h.clone().with_role(HostRole::Writer),
            (false, true) => h.clone().with_role(HostRole::Reader),
            (false, false) => h.clone(),
        })
        .collect();
    Ok(Topology::new(hosts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_with_writer_moves_the_writer_role() {
        let topology = Topology::new(vec![
            HostSpec::writer("db-1", 5432),
            HostSpec::reader("db-2", 5432),
        ])
        .unwrap();

        let rewritten = with_writer(&topology, &HostSpec::new("db-2", Some(5432))).unwrap();

        assert_eq!(rewritten.writer().map(|w| w.host()), Some("db-2"));
        assert_eq!(rewritten.readers().count(), 1);
    }

    #[test]
    fn test_with_writer_rejects_unknown_host() {
        let topology = Topology::new(vec![HostSpec::writer("db-1", 5432)]).unwrap();
        assert!(with_writer(&topology, &HostSpec::new("db-9", Some(5432))).is_err());
    }
}
