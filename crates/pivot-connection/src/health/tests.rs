
use super::*;
use async_trait::async_trait;
use pivot_core::{Connection, PivotError, QueryResult, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

struct MockConnection {
    driver_name: &'static str,
    closed: AtomicBool,
    fail_queries: bool,
    query_delay: Duration,
    query_count: AtomicU32,
}

impl MockConnection {
    fn healthy() -> Self {
        Self {
            driver_name: "postgresql",
            closed: AtomicBool::new(false),
            fail_queries: false,
            query_delay: Duration::ZERO,
            query_count: AtomicU32::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Self::healthy()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            query_delay: delay,
            ..Self::healthy()
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        self.driver_name
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        assert_eq!(sql, ping::LIVENESS_QUERY);
        self.query_count.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        if self.fail_queries {
            return Err(PivotError::Query("server is starting up".into()));
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

mod ping_tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_healthy_connection() {
        let conn = MockConnection::healthy();
        assert!(ping_connection(&conn).await.is_ok());
        assert_eq!(conn.query_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ping_closed_connection_skips_query() {
        let conn = MockConnection::healthy();
        conn.close().await.unwrap();

        assert_eq!(ping_connection(&conn).await, Err(PingError::ConnectionClosed));
        assert_eq!(conn.query_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ping_query_failure() {
        let conn = MockConnection::failing();
        let err = ping_connection(&conn).await.unwrap_err();
        assert!(matches!(err, PingError::QueryFailed(msg) if msg.contains("starting up")));
    }

    #[test]
    fn test_ping_error_display() {
        assert_eq!(
            PingError::Timeout(Duration::from_millis(250)).to_string(),
            "no reply within 250ms"
        );
        assert_eq!(
            PingError::QueryFailed("boom".into()).to_string(),
            "liveness query failed: boom"
        );
    }
}

mod validate_tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_healthy() {
        let conn = MockConnection::healthy();
        assert!(validate_connection(&conn, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_failure_is_validation_error() {
        let conn = MockConnection::failing();
        let err = validate_connection(&conn, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PivotError::Validation(_)));
        assert!(!conn.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_times_out() {
        let conn = MockConnection::slow(Duration::from_secs(10));
        let err = validate_connection(&conn, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, PivotError::Validation(msg) if msg == "no reply within 500ms"));
    }
}
