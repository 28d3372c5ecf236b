//! PostgreSQL database
//!
//! Statements run on a `deadpool-postgres` pool. Parameters are sent in the
//! text wire format so the server infers their column types: an id taken
//! from the URL path binds to an integer key the same way a JSON number does.
//! Result cells are decoded per column type into [`Cell`]s; a column of a
//! type without a decoding fails the statement rather than leaking wire bytes.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{
    Config as PoolSettings, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use serde_json::Value as JsonValue;
use postgres_protocol::types;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::{CancelToken, NoTls, Row};
use tracing::{debug, info, warn};

use data_common::config::DatabaseConfig;
use data_common::error::{Error, Result};

use crate::backend::{Cell, Database, RowSet};
use crate::query::Statement;

type BoxError = Box<dyn StdError + Sync + Send>;

/// Pooled PostgreSQL connection
pub struct PgDatabase {
    pool: Pool,
    statement_timeout: Duration,
}

impl PgDatabase {
    /// Build the pool and verify that the server answers
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = Self::from_pool(
            build_pool(config)?,
            Duration::from_millis(config.statement_timeout_ms),
        );
        db.ping().await?;

        info!(
            pool_size = config.pool_size,
            statement_timeout_ms = config.statement_timeout_ms,
            "Connected to PostgreSQL"
        );
        Ok(db)
    }

    pub fn from_pool(pool: Pool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Round-trip a trivial statement
    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await.map_err(db_error)?;
        Ok(())
    }

    /// Close the pool; idle connections are dropped, checked-out ones on return
    pub fn close(&self) {
        self.pool.close();
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Execution(format!("failed to acquire connection: {e}")))
    }

    /// Await `fut` within the statement deadline; on expiry the running
    /// statement is cancelled server-side.
    async fn deadline<T, F>(&self, token: CancelToken, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, tokio_postgres::Error>> + Send,
    {
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Ok(result) => result.map_err(db_error),
            Err(_) => {
                warn!(
                    timeout = ?self.statement_timeout,
                    "statement timed out, cancelling"
                );
                if let Err(e) = token.cancel_query(NoTls).await {
                    warn!(error = %e, "failed to cancel statement");
                }
                Err(Error::Execution("statement timed out".to_string()))
            }
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn query(&self, statement: &Statement) -> Result<RowSet> {
        debug!(sql = %statement.sql, params = statement.params.len(), "query");
        let client = self.client().await?;
        let params = text_params(&statement.params);

        let (columns, rows) = self
            .deadline(client.cancel_token(), async {
                let prepared = client.prepare(&statement.sql).await?;
                let rows = client.query(&prepared, &param_refs(&params)).await?;
                let columns: Vec<String> = prepared
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
                Ok::<_, tokio_postgres::Error>((columns, rows))
            })
            .await?;

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
        Ok(RowSet::new(columns, rows))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        debug!(sql = %statement.sql, params = statement.params.len(), "execute");
        let client = self.client().await?;
        let params = text_params(&statement.params);

        self.deadline(client.cancel_token(), async {
            let prepared = client.prepare(&statement.sql).await?;
            client.execute(&prepared, &param_refs(&params)).await
        })
        .await
    }
}

fn build_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut settings = PoolSettings::new();
    match &config.url {
        Some(url) => settings.url = Some(url.clone()),
        None => {
            settings.host = Some(config.host.clone());
            settings.port = Some(config.port);
            settings.dbname = Some(config.database.clone());
            settings.user = Some(config.user.clone());
            settings.password = Some(config.password.clone());
        }
    }
    settings.application_name = Some(env!("CARGO_PKG_NAME").to_string());

    let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
    settings.connect_timeout = Some(connect_timeout);

    let mut pool = PoolConfig::new(config.pool_size);
    pool.timeouts.wait = Some(connect_timeout);
    pool.timeouts.create = Some(connect_timeout);
    settings.pool = Some(pool);
    settings.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    settings
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| Error::Config(format!("invalid database settings: {e}")))
}

fn db_error(err: tokio_postgres::Error) -> Error {
    match err.as_db_error() {
        Some(db) => {
            warn!(code = db.code().code(), message = db.message(), "statement failed");
            Error::Execution(db.message().to_string())
        }
        None => {
            warn!(error = %err, "database error");
            Error::Execution(err.to_string())
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// A JSON literal bound in text format
#[derive(Debug)]
struct TextParam<'a>(&'a JsonValue);

impl ToSql for TextParam<'_> {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self.0 {
            JsonValue::Null => return Ok(IsNull::Yes),
            JsonValue::String(s) => out.extend_from_slice(s.as_bytes()),
            other => out.extend_from_slice(other.to_string().as_bytes()),
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn text_params(values: &[JsonValue]) -> Vec<TextParam<'_>> {
    values.iter().map(TextParam).collect()
}

fn param_refs<'a>(params: &'a [TextParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}

// ============================================================================
// Result decoding
// ============================================================================

fn decode_row(row: &Row) -> Result<Vec<Cell>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            decode_cell(row, idx, column.type_()).map_err(|e| {
                Error::Execution(format!(
                    "cannot decode column {} ({}): {e}",
                    column.name(),
                    column.type_()
                ))
            })
        })
        .collect()
}

fn decode_cell(row: &Row, idx: usize, ty: &Type) -> std::result::Result<Cell, BoxError> {
    let cell = match ty.kind() {
        Kind::Array(member) if <Scalar as FromSql>::accepts(member) => row
            .try_get::<_, Option<Vec<Option<Scalar>>>>(idx)?
            .map(|items| {
                Cell::Array(
                    items
                        .into_iter()
                        .map(|item| item.map_or(Cell::Null, |s| s.0))
                        .collect(),
                )
            }),
        _ if <Scalar as FromSql>::accepts(ty) => {
            row.try_get::<_, Option<Scalar>>(idx)?.map(|s| s.0)
        }
        _ => return Err(format!("unsupported column type {ty}").into()),
    };
    Ok(cell.unwrap_or(Cell::Null))
}

/// A non-null value of a supported column or array element type
struct Scalar(Cell);

impl<'a> FromSql<'a> for Scalar {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        let cell = match *ty {
            Type::BOOL => Cell::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Cell::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Cell::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Cell::Int(i64::from_sql(ty, raw)?),
            Type::OID => Cell::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Cell::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Cell::Float(f64::from_sql(ty, raw)?),
            // Decimal holds 28 significant digits. Wider values, NaN and the
            // infinities fail the column instead of being rounded.
            Type::NUMERIC => Cell::Text(Decimal::from_sql(ty, raw)?.to_string()),
            Type::BYTEA => Cell::Bytes(raw.to_vec()),
            Type::JSON | Type::JSONB => Cell::Json(JsonValue::from_sql(ty, raw)?),
            Type::UUID => Cell::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => {
                Cell::Text(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_rfc3339())
            }
            Type::TIMESTAMP => Cell::Text(chrono::NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::DATE => Cell::Text(chrono::NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Cell::Text(chrono::NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMETZ => Cell::Text(time_tz(raw)?),
            Type::INTERVAL => Cell::Text(interval(raw)?),
            Type::INET | Type::CIDR => Cell::Text(inet(ty, raw)?),
            Type::MACADDR => Cell::Text(mac(&types::macaddr_from_sql(raw)?)),
            // text-like: character types, citext, xml and enum labels
            _ => Cell::Text(String::from_sql(ty, raw)?),
        };
        Ok(Self(cell))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::OID
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::BYTEA
                | Type::JSON
                | Type::JSONB
                | Type::UUID
                | Type::TIMESTAMPTZ
                | Type::TIMESTAMP
                | Type::DATE
                | Type::TIME
                | Type::TIMETZ
                | Type::INTERVAL
                | Type::INET
                | Type::CIDR
                | Type::MACADDR
                | Type::XML
        ) || matches!(ty.kind(), Kind::Enum(_))
            || <String as FromSql>::accepts(ty)
    }
}

/// `HH:MM:SS` with a trimmed microsecond fraction
fn clock(micros: u64) -> String {
    let secs = micros / 1_000_000;
    let mut out = format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
    let fraction = micros % 1_000_000;
    if fraction > 0 {
        out.push_str(&format!(".{fraction:06}").trim_end_matches('0'));
    }
    out
}

/// Binary INTERVAL (microseconds, days, months) in the server's default
/// `postgres` output style, e.g. `1 year 2 mons 3 days 04:05:06`.
fn interval(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() != 16 {
        return Err("invalid interval length".into());
    }
    let micros = types::int8_from_sql(&raw[..8])?;
    let days = types::int4_from_sql(&raw[8..12])?;
    let months = types::int4_from_sql(&raw[12..])?;

    let mut out = String::new();
    let mut negative_before = false;
    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        if negative_before && value > 0 {
            out.push('+');
        }
        let plural = if value == 1 { "" } else { "s" };
        out.push_str(&format!("{value} {unit}{plural}"));
        negative_before = value < 0;
    }

    if micros != 0 || out.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        if micros < 0 {
            out.push('-');
        } else if negative_before {
            out.push('+');
        }
        out.push_str(&clock(micros.unsigned_abs()));
    }
    Ok(out)
}

/// Binary TIMETZ: microseconds since midnight, then the zone offset in
/// seconds west of UTC.
fn time_tz(raw: &[u8]) -> std::result::Result<String, BoxError> {
    if raw.len() != 12 {
        return Err("invalid timetz length".into());
    }
    let micros = types::time_from_sql(&raw[..8])?;
    let west = types::int4_from_sql(&raw[8..])?;

    let mut out = clock(micros.unsigned_abs());
    out.push(if west <= 0 { '+' } else { '-' });
    let offset = west.unsigned_abs();
    out.push_str(&format!("{:02}", offset / 3600));
    if offset % 3600 != 0 {
        out.push_str(&format!(":{:02}", offset / 60 % 60));
    }
    if offset % 60 != 0 {
        out.push_str(&format!(":{:02}", offset % 60));
    }
    Ok(out)
}

/// INET omits a full-length netmask; CIDR always shows it
fn inet(ty: &Type, raw: &[u8]) -> std::result::Result<String, BoxError> {
    let inet = types::inet_from_sql(raw)?;
    let full = if inet.addr().is_ipv4() { 32 } else { 128 };
    if *ty == Type::CIDR || inet.netmask() != full {
        Ok(format!("{}/{}", inet.addr(), inet.netmask()))
    } else {
        Ok(inet.addr().to_string())
    }
}

fn mac(octets: &[u8]) -> String {
    octets
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
