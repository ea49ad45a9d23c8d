//! PostgreSQL-backed snapshot store

use crate::db::queries::{self, with_table};
use crate::error::MonitorResult;
use crate::introspection::TableRef;
use crate::models::TableSnapshot;
use crate::snapshot::codec::{decode_rows, encode_rows};
use crate::snapshot::store::SnapshotStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tracing::{debug, info};

/// Default name of the table holding snapshots
pub const DEFAULT_STORE_TABLE: &str = "table_monitor";

/// Stores one row per monitored table; the row list goes to a `BYTEA` payload
pub struct PostgresSnapshotStore {
    pool: Pool,
    /// Quoted, possibly schema-qualified store table
    table: String,
}

impl PostgresSnapshotStore {
    pub fn new(pool: Pool, store_table: &str) -> Self {
        Self {
            pool,
            table: TableRef::parse(store_table).quoted(),
        }
    }

    /// Create the store table if it does not exist
    pub async fn ensure_table(&self) -> MonitorResult<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(&with_table(queries::CREATE_SNAPSHOT_TABLE, &self.table))
            .await?;
        info!("Snapshot table {} ready", self.table);
        Ok(())
    }

    fn from_row(row: &tokio_postgres::Row) -> MonitorResult<TableSnapshot> {
        let row_data: Option<Vec<u8>> = row.try_get("row_data")?;
        Ok(TableSnapshot {
            table_name: row.try_get("table_name")?,
            created_at: row.try_get::<_, DateTime<Utc>>("created_at")?,
            updated_at: row.try_get::<_, DateTime<Utc>>("updated_at")?,
            primary_key_override: row.try_get("primary_key_override")?,
            rows: decode_rows(row_data.as_deref())?,
            reserved: row.try_get("reserved")?,
        })
    }
}

#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn get(&self, table_name: &str) -> MonitorResult<Option<TableSnapshot>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(with_table(queries::SELECT_SNAPSHOT, &self.table).as_str(), &[&table_name])
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_all(&self) -> MonitorResult<Vec<TableSnapshot>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(with_table(queries::SELECT_ALL_SNAPSHOTS, &self.table).as_str(), &[])
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn save(&self, snapshot: &TableSnapshot) -> MonitorResult<()> {
        let row_data = encode_rows(&snapshot.rows)?;
        let client = self.pool.get().await?;
        client
            .execute(
                with_table(queries::UPSERT_SNAPSHOT, &self.table).as_str(),
                &[
                    &snapshot.table_name,
                    &snapshot.created_at,
                    &snapshot.updated_at,
                    &snapshot.primary_key_override,
                    &row_data,
                    &snapshot.reserved,
                ],
            )
            .await?;

        debug!(
            "Saved snapshot for table {}: {} rows, {} bytes",
            snapshot.table_name,
            snapshot.rows.len(),
            row_data.len()
        );
        Ok(())
    }

    async fn delete(&self, table_name: &str) -> MonitorResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(with_table(queries::DELETE_SNAPSHOT, &self.table).as_str(), &[&table_name])
            .await?;
        Ok(deleted > 0)
    }
}
