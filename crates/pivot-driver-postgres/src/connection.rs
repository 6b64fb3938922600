//! PostgreSQL connection implementation

use async_trait::async_trait;
use pivot_core::{ColumnMeta, Connection, PivotError, QueryResult, Result, Row, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, NoTls, Row as PgRow, Statement};

use crate::tls::{TlsMode, TlsSettings, build_tls_connector};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail().filter(|d| !d.trim().is_empty()) {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint().filter(|h| !h.trim().is_empty()) {
        message.push_str(&format!(" (hint: {})", hint));
    }
    format!("{} (code: {})", message, db_error.code().code())
}

/// A single tokio-postgres client.
///
/// Closing drops the client and stops the task driving its socket, so a
/// closed connection never holds a server session open.
pub struct PostgresConnection {
    client: Mutex<Option<Client>>,
    driver: AbortHandle,
    closed: AtomicBool,
}

impl PostgresConnection {
    pub async fn connect(config: &tokio_postgres::Config, tls: &TlsSettings) -> Result<Self> {
        tracing::debug!(
            hosts = ?config.get_hosts(),
            ports = ?config.get_ports(),
            sslmode = tls.mode.as_sslmode(),
            "connecting to PostgreSQL"
        );

        let (client, driver) = if tls.mode == TlsMode::Disable {
            let (client, connection) = config.connect(NoTls).await.map_err(connect_error)?;
            (client, spawn_driver(connection))
        } else {
            let connector = build_tls_connector(tls)?;
            let (client, connection) = config.connect(connector).await.map_err(connect_error)?;
            (client, spawn_driver(connection))
        };

        Ok(Self {
            client: Mutex::new(Some(client)),
            driver,
            closed: AtomicBool::new(false),
        })
    }

    async fn prepare(&self, client: &Client, sql: &str) -> Result<Statement> {
        client.prepare(sql).await.map_err(|e| self.classify(client, &e))
    }

    /// Map a client error, noticing when the session itself went away
    fn classify(&self, client: &Client, error: &tokio_postgres::Error) -> PivotError {
        if client.is_closed() {
            self.closed.store(true, Ordering::SeqCst);
            return PivotError::Connection(format!(
                "PostgreSQL connection lost: {}",
                format_postgres_error(error)
            ));
        }
        PivotError::Query(format_postgres_error(error))
    }
}

fn connect_error(error: tokio_postgres::Error) -> PivotError {
    PivotError::Connection(format!(
        "Failed to connect to PostgreSQL: {}",
        format_postgres_error(&error)
    ))
}

fn spawn_driver<F>(connection: F) -> AbortHandle
where
    F: Future<Output = std::result::Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "PostgreSQL connection ended with error");
        }
    })
    .abort_handle()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let started = std::time::Instant::now();
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| PivotError::Connection("connection is closed".into()))?;

        let statement = self.prepare(client, sql).await?;
        let pg_rows = client
            .query(&statement, &[])
            .await
            .map_err(|e| self.classify(client, &e))?;

        let columns: Vec<ColumnMeta> = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(ordinal, col)| ColumnMeta {
                name: col.name().to_string(),
                data_type: col.type_().name().to_string(),
                ordinal,
            })
            .collect();
        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();

        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| postgres_to_value(pg_row, idx))
                    .collect();
                Row::new(names.clone(), values)
            })
            .collect::<Vec<_>>();

        let elapsed = started.elapsed();
        tracing::debug!(
            row_count = rows.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "query executed"
        );
        Ok(QueryResult {
            columns,
            rows,
            elapsed,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.client.lock().await.take().is_some() {
            self.driver.abort();
            tracing::debug!("PostgreSQL connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return true;
        }
        match self.client.try_lock() {
            Ok(guard) => guard.as_ref().is_none_or(Client::is_closed),
            // Busy with a query, so still open
            Err(_) => false,
        }
    }
}

/// NUMERIC rendered as text with its display scale
#[derive(Debug)]
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        decode_numeric(raw).map(Self)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Any other type whose binary form is UTF-8 text, such as enums
#[derive(Debug)]
struct PgText(String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Decode the binary NUMERIC wire format: a header of digit count, weight,
/// sign and display scale followed by base-10000 digit groups.
fn decode_numeric(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() < 8 {
        return Err("NUMERIC payload too short".into());
    }
    let word = |offset: usize| u16::from_be_bytes([raw[offset], raw[offset + 1]]);
    let ndigits = word(0) as usize;
    let weight = i32::from(word(2) as i16);
    let sign = word(4);
    let dscale = word(6) as usize;
    if raw.len() < 8 + ndigits * 2 {
        return Err("NUMERIC payload truncated".into());
    }

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let group = |index: i32| -> u16 {
        if index < 0 || index as usize >= ndigits {
            0
        } else {
            word(8 + index as usize * 2)
        }
    };

    let mut integer = String::new();
    for index in 0..=weight {
        let g = group(index);
        if integer.is_empty() {
            if g != 0 {
                integer = g.to_string();
            }
        } else {
            integer.push_str(&format!("{:04}", g));
        }
    }
    if integer.is_empty() {
        integer.push('0');
    }

    let mut fraction = String::new();
    let mut index = weight + 1;
    while fraction.len() < dscale {
        fraction.push_str(&format!("{:04}", group(index)));
        index += 1;
    }
    fraction.truncate(dscale);

    let is_zero = integer == "0" && fraction.chars().all(|c| c == '0');
    let mut text = String::new();
    if sign == 0x4000 && !is_zero {
        text.push('-');
    }
    text.push_str(&integer);
    if !fraction.is_empty() {
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

fn cell<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize, wrap: impl FnOnce(T) -> Value) -> Value {
    row.try_get::<_, Option<T>>(idx)
        .ok()
        .flatten()
        .map(wrap)
        .unwrap_or(Value::Null)
}

fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    match row.columns()[idx].type_().name() {
        "bool" => cell(row, idx, Value::Bool),
        "int2" => cell(row, idx, Value::Int16),
        "int4" => cell(row, idx, Value::Int32),
        "int8" => cell(row, idx, Value::Int64),
        "oid" => cell(row, idx, |v: u32| Value::Int64(i64::from(v))),
        "float4" => cell(row, idx, |v: f32| Value::Float64(f64::from(v))),
        "float8" => cell(row, idx, Value::Float64),
        "numeric" => cell(row, idx, |v: PgNumeric| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" => cell(row, idx, Value::String),
        "bytea" => cell(row, idx, Value::Bytes),
        "uuid" => cell(row, idx, Value::Uuid),
        "json" | "jsonb" => cell(row, idx, Value::Json),
        "date" => cell(row, idx, |v: chrono::NaiveDate| Value::String(v.to_string())),
        "time" => cell(row, idx, |v: chrono::NaiveTime| Value::String(v.to_string())),
        "timestamp" => cell(row, idx, Value::DateTime),
        "timestamptz" => cell(row, idx, Value::DateTimeUtc),
        _ => cell(row, idx, |v: PgText| Value::String(v.0)),
    }
}
