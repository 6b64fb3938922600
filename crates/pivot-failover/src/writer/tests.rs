//! Tests for writer failover

use super::*;
use crate::result::{RECONNECT_TASK, TOPOLOGY_UPDATE_TASK};
use crate::test_support::{
    Outcome, ScriptedProvider, ScriptedTopologySource, same_connection, service, topology,
};
use pivot_core::Connection;
use pretty_assertions::assert_eq;
use std::time::Duration;

fn handler(
    provider: Arc<ScriptedProvider>,
    source: Arc<ScriptedTopologySource>,
    config: FailoverConfig,
) -> WriterFailoverHandler {
    WriterFailoverHandler::new(
        provider,
        service(source),
        "mock://",
        ConnectionProperties::new(),
        config,
    )
}

fn before_failover() -> Topology {
    topology(vec![
        HostSpec::writer("db-1", 5432),
        HostSpec::reader("db-2", 5432),
        HostSpec::reader("db-3", 5432),
    ])
}

fn after_failover() -> Topology {
    topology(vec![
        HostSpec::reader("db-1", 5432),
        HostSpec::writer("db-2", 5432),
        HostSpec::reader("db-3", 5432),
    ])
}

fn assert_consistent(result: &FailoverResult) {
    assert_eq!(result.is_connected(), result.connection().is_some());
    if result.is_connected() {
        assert!(result.error().is_none());
        assert!(result.host().is_some());
    } else {
        assert!(result.error().is_some());
        assert!(result.topology().is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn test_healthy_cluster_reconnects_to_same_writer() {
    let provider = Arc::new(ScriptedProvider::new().script("db-1", [Outcome::Accept]));
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default(),
    );

    let first = handler.failover(&before_failover()).await;
    let second = handler.failover(&before_failover()).await;

    for result in [&first, &second] {
        assert_consistent(result);
        assert!(result.is_connected());
        assert_eq!(result.task_name(), RECONNECT_TASK);
        assert!(!result.is_new_host());
        assert_eq!(result.host().map(|h| h.host()), Some("db-1"));
    }
    assert!(!first.connection().unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_new_writer_found_through_topology() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .script("db-1", [Outcome::Refuse])
            .script("db-2", [Outcome::Accept]),
    );
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(after_failover()),
        FailoverConfig::default(),
    );

    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert!(result.is_connected());
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);
    assert!(result.is_new_host());
    let writer = result.topology().and_then(Topology::writer).unwrap();
    assert!(!writer.is_same_host(&HostSpec::writer("db-1", 5432)));
    assert!(same_connection(
        result.connection().unwrap(),
        &provider.opened("db-2")[0]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_same_tick_success_prefers_topology_update() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .script("db-1", [Outcome::Accept])
            .delay("db-1", Duration::from_millis(100))
            .script("db-2", [Outcome::Accept])
            .delay("db-2", Duration::from_millis(100)),
    );
    // The topology watch sees the new writer; the reconnect's confirmation
    // refresh fails, so the reconnect also counts as a success.
    let source = ScriptedTopologySource::new(vec![Ok(after_failover()), Err("stale".into())]);
    let handler = handler(provider.clone(), source, FailoverConfig::default());

    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);
    assert_eq!(result.host().map(|h| h.host()), Some("db-2"));
    assert_eq!(result.elapsed(), Duration::from_millis(100));

    let reconnected = provider.opened("db-1");
    assert_eq!(reconnected.len(), 1);
    assert!(reconnected[0].is_closed());
    assert!(!result.connection().unwrap().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_waits_for_in_flight_topology_attempt() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .script("db-1", [Outcome::Accept])
            .delay("db-1", Duration::from_millis(50))
            .script("db-2", [Outcome::Accept])
            .delay("db-2", Duration::from_millis(200)),
    );
    // The topology watch sees the new writer first and is still connecting to
    // it when the reconnect's failed confirmation refresh lets it through.
    let source = ScriptedTopologySource::new(vec![Ok(after_failover()), Err("stale".into())]);
    let handler = handler(provider.clone(), source, FailoverConfig::default());

    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);
    assert_eq!(result.host().map(|h| h.host()), Some("db-2"));
    assert!(result.elapsed() >= Duration::from_millis(200));
    assert!(!result.connection().unwrap().is_closed());
    assert!(provider.opened("db-1").iter().all(|c| c.is_closed()));
}

#[tokio::test(start_paused = true)]
async fn test_late_loser_connection_is_closed() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .script("db-1", [Outcome::Accept])
            .delay("db-1", Duration::from_secs(1))
            .script("db-2", [Outcome::Accept]),
    );
    let source = ScriptedTopologySource::new(vec![Ok(after_failover()), Err("stale".into())]);
    let handler = handler(provider.clone(), source, FailoverConfig::default());

    let result = handler.failover(&before_failover()).await;
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);

    tokio::time::sleep(Duration::from_secs(2)).await;

    let late = provider.opened("db-1");
    assert_eq!(late.len(), 1);
    assert!(late[0].is_closed());
    assert!(!same_connection(result.connection().unwrap(), &late[0]));
    assert!(!result.connection().unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_cluster_times_out_at_deadline() {
    let provider = Arc::new(ScriptedProvider::new());
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default(),
    );

    let started = Instant::now();
    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert!(!result.is_connected());
    assert_eq!(result.task_name(), WRITER_FAILOVER_TASK);
    assert!(matches!(result.error(), Some(PivotError::FailoverTimeout(_))));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed <= Duration::from_secs(60) + Duration::from_millis(10));
    assert!(provider.connects("db-1") > 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_failover_stops_its_tasks() {
    let provider = Arc::new(ScriptedProvider::new());
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default(),
    );

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), handler.failover(&before_failover())).await;
    assert!(abandoned.is_err());
    let attempts = provider.connects("db-1");

    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(attempts, 1);
    assert_eq!(provider.connects("db-1"), attempts);
}

#[tokio::test(start_paused = true)]
async fn test_writer_without_writer_role_is_not_reconnected() {
    let provider = Arc::new(ScriptedProvider::new().script("db-1", [Outcome::Accept]));
    let writerless = topology(vec![
        HostSpec::reader("db-1", 5432),
        HostSpec::reader("db-2", 5432),
        HostSpec::reader("db-3", 5432),
    ]);
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(writerless),
        FailoverConfig::default().with_max_task_attempts(2),
    );

    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert!(!result.is_connected());
    assert!(result.error().unwrap().is_topology());
    let opened = provider.opened("db-1");
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|c| c.is_closed()));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_tasks_report_most_specific_error() {
    let provider = Arc::new(ScriptedProvider::new().script("db-1", [Outcome::Refuse]));
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default().with_max_task_attempts(2),
    );

    let result = handler.failover(&before_failover()).await;

    assert_consistent(&result);
    assert!(!result.is_connected());
    assert!(result.error().unwrap().is_topology());
    assert_eq!(provider.connects("db-1"), 2);
    assert!(result.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_unvalidated_connections_are_never_returned() {
    let provider = Arc::new(ScriptedProvider::new().script("db-1", [Outcome::FailValidation]));
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default().with_max_task_attempts(3),
    );

    let result = handler.failover(&before_failover()).await;

    assert!(!result.is_connected());
    let opened = provider.all_opened();
    assert_eq!(opened.len(), 3);
    assert!(opened.iter().all(|c| c.is_closed()));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_prior_writer_waits_for_topology() {
    let provider = Arc::new(ScriptedProvider::new().script("db-2", [Outcome::Accept]));
    let prior = topology(vec![
        HostSpec::reader("db-2", 5432),
        HostSpec::reader("db-3", 5432),
    ]);
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(after_failover()),
        FailoverConfig::default(),
    );

    let result = handler.failover(&prior).await;

    assert!(result.is_connected());
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);
    assert!(result.is_new_host());
    assert_eq!(provider.connects("db-1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_writer_failback_to_same_host() {
    let provider = Arc::new(
        ScriptedProvider::new()
            .script("db-1", [Outcome::Refuse, Outcome::Accept])
            .delay("db-1", Duration::from_millis(10)),
    );
    let prior = topology(vec![
        HostSpec::writer("db-1", 5432).with_availability(pivot_core::HostAvailability::Unavailable),
        HostSpec::reader("db-2", 5432),
    ]);
    let handler = handler(
        provider.clone(),
        ScriptedTopologySource::fixed(before_failover()),
        FailoverConfig::default(),
    );

    let result = handler.failover(&prior).await;

    assert!(result.is_connected());
    assert_eq!(result.host().map(|h| h.host()), Some("db-1"));
    assert_eq!(result.task_name(), TOPOLOGY_UPDATE_TASK);
    assert!(!result.is_new_host());
}
