//! Database access
//!
//! Connection pooling and the streaming row source used by the detector.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::{ColumnValue, Row};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use futures::TryStreamExt;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Callback invoked once per result row, in result order
pub type RowVisitor<'a> = dyn FnMut(Row) -> MonitorResult<()> + Send + 'a;

/// Executes a row query and hands every row to a visitor as it is read
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Run `sql` and feed each row to `visit`. Stops at the first error from
    /// either the database or the visitor. Returns the number of rows visited.
    async fn scan(&self, sql: &str, visit: &mut RowVisitor<'_>) -> MonitorResult<u64>;
}

/// Create a connection pool, with TLS when the configuration asks for it
pub async fn create_pool(config: &DatabaseConfig) -> MonitorResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    }
    .map_err(|e| MonitorError::Internal(format!("Failed to create pool: {}", e)))?;

    // Test the connection
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    drop(client);

    info!(
        "Database pool established for {}:{}/{} (TLS: {})",
        config.host, config.port, config.database, config.use_tls
    );
    Ok(pool)
}

/// Row source reading from PostgreSQL through a row stream
#[derive(Clone)]
pub struct PostgresRowSource {
    pool: Pool,
}

impl PostgresRowSource {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for PostgresRowSource {
    async fn scan(&self, sql: &str, visit: &mut RowVisitor<'_>) -> MonitorResult<u64> {
        let client = self.pool.get().await?;
        let params: Vec<String> = Vec::new();
        let stream = client.query_raw(sql, params).await?;
        let mut stream = std::pin::pin!(stream);

        let mut visited = 0u64;
        while let Some(pg_row) = stream.try_next().await? {
            visit(convert_row(&pg_row)?)?;
            visited += 1;
        }

        debug!("Scanned {} rows", visited);
        Ok(visited)
    }
}

/// Convert a PostgreSQL row into typed column values
pub fn convert_row(row: &tokio_postgres::Row) -> MonitorResult<Row> {
    let mut out = Row::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = convert_value(row, idx, column.name(), column.type_().name())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

/// Type names read into a typed [`ColumnValue`]. Columns of other types
/// must be selected as text.
pub const NATIVE_TYPES: &[&str] = &[
    "bool", "int2", "int4", "int8", "oid", "float4", "float8", "text", "varchar", "bpchar",
    "name", "citext", "timestamptz", "timestamp", "date", "uuid", "json", "jsonb",
];

pub fn has_native_conversion(type_name: &str) -> bool {
    NATIVE_TYPES.contains(&type_name)
}

fn convert_value(
    row: &tokio_postgres::Row,
    idx: usize,
    column: &str,
    type_name: &str,
) -> MonitorResult<ColumnValue> {
    let value: ColumnValue = match type_name {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.into(),
        "int2" => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        "int4" => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.into(),
        "oid" => row.try_get::<_, Option<u32>>(idx)?.map(i64::from).into(),
        "float4" => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.into(),
        "text" | "varchar" | "bpchar" | "name" | "citext" => {
            row.try_get::<_, Option<String>>(idx)?.into()
        }
        "timestamptz" => row.try_get::<_, Option<DateTime<Utc>>>(idx)?.into(),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|ts| ts.and_utc())
            .into(),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| d.to_string())
            .into(),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| u.to_string())
            .into(),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| v.to_string())
            .into(),
        other => {
            return Err(MonitorError::UnsupportedType {
                column: column.to_string(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_conversion_covers_common_scalars_only() {
        for name in ["int4", "int8", "float8", "text", "timestamptz", "uuid", "jsonb"] {
            assert!(has_native_conversion(name), "{} should be native", name);
        }
        for name in ["numeric", "interval", "inet", "bytea", "_int4", "time", "mood"] {
            assert!(!has_native_conversion(name), "{} should be cast to text", name);
        }
    }
}
