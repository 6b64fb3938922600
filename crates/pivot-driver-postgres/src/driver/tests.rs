use super::*;
use crate::TlsMode;
use pretty_assertions::assert_eq;
use tokio_postgres::config::Host;

fn tcp_hosts(config: &tokio_postgres::Config) -> Vec<String> {
    config
        .get_hosts()
        .iter()
        .filter_map(|h| match h {
            Host::Tcp(name) => Some(name.clone()),
            #[allow(unreachable_patterns)]
            _ => None,
        })
        .collect()
}

#[test]
fn test_driver_identity() {
    let driver = PostgresDriver::new();
    assert_eq!(driver.id(), "postgres");
    assert_eq!(driver.name(), "PostgreSQL");
    assert_eq!(driver.protocol(), "postgresql://");
    assert_eq!(driver.default_port(), Some(5432));
}

#[test]
fn test_url_supplies_host_port_and_database() {
    let (config, _) = connect_config(
        "postgresql://db-1.cluster.local:6432/orders",
        &ConnectionProperties::new().with_user("app"),
    )
    .unwrap();

    assert_eq!(tcp_hosts(&config), vec!["db-1.cluster.local".to_string()]);
    assert_eq!(config.get_ports(), &[6432]);
    assert_eq!(config.get_dbname(), Some("orders"));
    assert_eq!(config.get_user(), Some("app"));
    assert_eq!(config.get_application_name(), Some("pivot"));
}

#[test]
fn test_url_without_database() {
    let (config, _) = connect_config("postgresql://db-1/", &ConnectionProperties::new()).unwrap();
    assert_eq!(tcp_hosts(&config), vec!["db-1".to_string()]);
    assert_eq!(config.get_dbname(), None);
}

#[test]
fn test_properties_set_credentials_and_options() {
    let props = ConnectionProperties::new()
        .with_user("app")
        .with_password("secret")
        .with_param("connect_timeout", "7")
        .with_param("application_name", "orders-api")
        .with_param("sslmode", "disable");

    let (config, tls) = connect_config("postgresql://db-1:5432/orders", &props).unwrap();

    assert_eq!(config.get_password(), Some(b"secret".as_slice()));
    assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(7)));
    assert_eq!(config.get_application_name(), Some("orders-api"));
    assert_eq!(tls.mode, TlsMode::Disable);
    assert_eq!(config.get_ssl_mode(), tokio_postgres::config::SslMode::Disable);
}

#[test]
fn test_bad_connect_timeout_is_configuration_error() {
    let props = ConnectionProperties::new().with_param("connect_timeout", "soon");
    let err = connect_config("postgresql://db-1:5432/orders", &props).unwrap_err();
    assert!(matches!(err, PivotError::Configuration(_)));
}

#[test]
fn test_invalid_url_is_configuration_error() {
    let err = connect_config("postgresql://db-1:notaport/orders", &ConnectionProperties::new())
        .unwrap_err();
    assert!(matches!(err, PivotError::Configuration(_)));
}

#[test]
fn test_unknown_sslmode_is_rejected() {
    let props = ConnectionProperties::new().with_param("sslmode", "maybe");
    assert!(connect_config("postgresql://db-1:5432/orders", &props).is_err());
}

#[tokio::test]
async fn test_connect_refused_is_connection_error() {
    // Nothing listens on port 1
    let props = ConnectionProperties::new()
        .with_user("app")
        .with_param("sslmode", "disable")
        .with_param("connect_timeout", "2");
    let err = match PostgresDriver::new()
        .connect("postgresql://127.0.0.1:1/orders", &props)
        .await
    {
        Ok(_) => panic!("expected connect to fail"),
        Err(e) => e,
    };
    assert!(matches!(err, PivotError::Connection(_)));
}
