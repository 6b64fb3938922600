//! Connection properties passed through to the network connector

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property key for the database name
pub const DATABASE_PROPERTY: &str = "database";
/// Property key for the user name
pub const USER_PROPERTY: &str = "user";
/// Property key for the password
pub const PASSWORD_PROPERTY: &str = "password";

/// Typed connection options.
///
/// The recognized options have named fields, everything else is carried in
/// `extra` and handed to the driver untouched.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Driver specific options
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ConnectionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set a passthrough option
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    /// Look up an option by key, checking the named fields before the passthrough map
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            DATABASE_PROPERTY => self.database.as_deref(),
            USER_PROPERTY => self.user.as_deref(),
            PASSWORD_PROPERTY => self.password.as_deref(),
            _ => self.extra.get(key).map(String::as_str),
        }
    }

    /// Parse a passthrough option, returning `None` when absent or malformed
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("extra", &self.extra)
            .finish()
    }
}
