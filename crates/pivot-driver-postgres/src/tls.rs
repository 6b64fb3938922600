//! PostgreSQL TLS Support
//!
//! Reads the TLS options from connection properties and builds the
//! native-tls connector handed to tokio-postgres.

use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use pivot_core::ConnectionProperties;
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_postgres::config::SslMode;
use tracing::debug;

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// Failed to load client certificate or key
    #[error("Failed to load client credential from {path}: {source}")]
    ClientCredentialLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid client identity format
    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("Unknown sslmode '{0}'")]
    UnknownMode(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),

    /// TLS mode not supported
    #[error("TLS mode {mode:?} is not supported for this operation")]
    UnsupportedMode { mode: TlsMode },
}

impl From<TlsError> for pivot_core::PivotError {
    fn from(err: TlsError) -> Self {
        pivot_core::PivotError::Configuration(err.to_string())
    }
}

/// libpq style `sslmode`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    Disable,
    /// Encrypt when the server offers TLS, without verifying it
    #[default]
    Prefer,
    /// Always encrypt, without verifying the server
    Require,
    /// Verify the server certificate chain but not its hostname
    VerifyCa,
    VerifyFull,
}

impl TlsMode {
    pub fn as_sslmode(&self) -> &'static str {
        match self {
            TlsMode::Disable => "disable",
            TlsMode::Prefer => "prefer",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        }
    }

    /// The negotiation mode tokio-postgres understands. Verification is
    /// handled by the connector, so both verify modes map to `Require`.
    pub fn postgres_ssl_mode(&self) -> SslMode {
        match self {
            TlsMode::Disable => SslMode::Disable,
            TlsMode::Prefer => SslMode::Prefer,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
        }
    }

    fn verifies_chain(&self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }
}

impl FromStr for TlsMode {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            "allow" | "prefer" => Ok(TlsMode::Prefer),
            "require" => Ok(TlsMode::Require),
            "verify-ca" | "verify_ca" => Ok(TlsMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(TlsMode::VerifyFull),
            other => Err(TlsError::UnknownMode(other.to_string())),
        }
    }
}

/// TLS options read from connection properties.
///
/// Both the libpq names (`sslmode`, `sslrootcert`, `sslcert`, `sslkey`) and
/// the underscore names (`ssl_mode`, `ssl_ca_cert`, `ssl_client_cert`,
/// `ssl_client_key`) are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub mode: TlsMode,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl TlsSettings {
    pub fn from_properties(properties: &ConnectionProperties) -> Result<Self, TlsError> {
        let lookup = |keys: &[&str]| lookup_property(properties, keys);

        let mode = match lookup(&["sslmode", "ssl_mode"]) {
            Some(mode) => mode.parse()?,
            None => TlsMode::default(),
        };
        let settings = Self {
            mode,
            ca_cert: lookup(&["sslrootcert", "ssl_ca_cert"]).map(PathBuf::from),
            client_cert: lookup(&["sslcert", "ssl_client_cert"]).map(PathBuf::from),
            client_key: lookup(&["sslkey", "ssl_client_key"]).map(PathBuf::from),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TlsError> {
        if self.mode.verifies_chain() && self.ca_cert.is_none() {
            return Err(TlsError::ConfigurationError(format!(
                "sslmode={} requires a CA certificate",
                self.mode.as_sslmode()
            )));
        }
        if self.client_cert.is_some() != self.client_key.is_some() {
            return Err(TlsError::ConfigurationError(
                "client certificate and key must be given together".into(),
            ));
        }
        Ok(())
    }
}

/// First non-empty value among `keys`
fn lookup_property<'a>(properties: &'a ConnectionProperties, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| properties.get(key))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Build a TLS connector for tokio-postgres.
///
/// Fails for `TlsMode::Disable`; callers connect with `NoTls` instead.
pub fn build_tls_connector(settings: &TlsSettings) -> Result<MakeTlsConnector, TlsError> {
    settings.validate()?;

    let mut builder = NativeTlsConnector::builder();
    match settings.mode {
        TlsMode::Disable => return Err(TlsError::UnsupportedMode { mode: settings.mode }),
        TlsMode::Prefer | TlsMode::Require => {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {}
    }

    if let Some(path) = &settings.ca_cert {
        apply_ca_cert(&mut builder, path)?;
    }
    if let (Some(cert), Some(key)) = (&settings.client_cert, &settings.client_key) {
        apply_client_cert(&mut builder, cert, key)?;
    }

    let connector = builder
        .build()
        .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;
    debug!(mode = settings.mode.as_sslmode(), "TLS connector built");
    Ok(MakeTlsConnector::new(connector))
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    let pem = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    let cert = Certificate::from_pem(&pem).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    let read = |path: &Path| {
        fs::read(path).map_err(|e| TlsError::ClientCredentialLoadFailed {
            path: path.display().to_string(),
            source: e,
        })
    };
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;

    // native-tls Identity::from_pkcs8 expects PEM cert and PEM key
    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;
    builder.identity(identity);
    Ok(())
}
