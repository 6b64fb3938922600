//! PostgreSQL network connector

mod connection;
mod driver;
mod tls;

pub use connection::PostgresConnection;
pub use driver::{PostgresDriver, connect_config};
pub use tls::{TlsError, TlsMode, TlsSettings, build_tls_connector};
