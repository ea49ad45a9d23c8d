//! Table Snapshot Store
//!
//! Persists exactly one snapshot per monitored table. The row list is kept as
//! an opaque encoded payload (see [`codec`](super::codec)); the remaining
//! fields are stored as plain columns.

use crate::error::MonitorResult;
use crate::models::TableSnapshot;
use crate::snapshot::codec::{decode_rows, encode_rows};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persistence contract for table snapshots, keyed by table name
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot for a table, `None` if it was never saved.
    async fn get(&self, table_name: &str) -> MonitorResult<Option<TableSnapshot>>;

    async fn get_all(&self) -> MonitorResult<Vec<TableSnapshot>>;

    /// Insert or replace the snapshot for `snapshot.table_name`.
    async fn save(&self, snapshot: &TableSnapshot) -> MonitorResult<()>;

    /// Returns `true` if a snapshot was removed.
    async fn delete(&self, table_name: &str) -> MonitorResult<bool>;

    async fn delete_snapshot(&self, snapshot: &TableSnapshot) -> MonitorResult<bool> {
        self.delete(&snapshot.table_name).await
    }
}

/// Stored form of a snapshot: plain metadata plus the encoded row payload
#[derive(Debug, Clone)]
struct StoredSnapshot {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    primary_key_override: Option<String>,
    row_data: Vec<u8>,
    reserved: Option<Vec<u8>>,
}

impl StoredSnapshot {
    fn encode(snapshot: &TableSnapshot) -> MonitorResult<Self> {
        Ok(Self {
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            primary_key_override: snapshot.primary_key_override.clone(),
            row_data: encode_rows(&snapshot.rows)?,
            reserved: snapshot.reserved.clone(),
        })
    }

    fn decode(&self, table_name: &str) -> MonitorResult<TableSnapshot> {
        Ok(TableSnapshot {
            table_name: table_name.to_string(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            primary_key_override: self.primary_key_override.clone(),
            rows: decode_rows(Some(self.row_data.as_slice()))?,
            reserved: self.reserved.clone(),
        })
    }
}

/// In-process store, used for tests and for running without a metadata database
#[derive(Default, Clone)]
pub struct MemorySnapshotStore {
    /// Table name -> stored snapshot
    snapshots: Arc<RwLock<HashMap<String, StoredSnapshot>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, table_name: &str) -> MonitorResult<Option<TableSnapshot>> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(table_name)
            .map(|stored| stored.decode(table_name))
            .transpose()
    }

    async fn get_all(&self) -> MonitorResult<Vec<TableSnapshot>> {
        let snapshots = self.snapshots.read().await;
        let mut all = snapshots
            .iter()
            .map(|(name, stored)| stored.decode(name))
            .collect::<MonitorResult<Vec<_>>>()?;
        all.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(all)
    }

    async fn save(&self, snapshot: &TableSnapshot) -> MonitorResult<()> {
        let stored = StoredSnapshot::encode(snapshot)?;
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.table_name.clone(), stored);

        tracing::debug!(
            "Saved snapshot for table {}: {} rows",
            snapshot.table_name,
            snapshot.rows.len()
        );
        Ok(())
    }

    async fn delete(&self, table_name: &str) -> MonitorResult<bool> {
        let mut snapshots = self.snapshots.write().await;
        Ok(snapshots.remove(table_name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnValue, RowRecord, RowValues};
    use pretty_assertions::assert_eq;

    fn sample(table: &str) -> TableSnapshot {
        let mut columns = RowValues::new();
        columns.insert("id".to_string(), ColumnValue::Int(1));
        let mut snapshot = TableSnapshot::new(table).with_primary_key_override("tenant");
        snapshot.rows.push(RowRecord::new("1", "abc", columns));
        snapshot.reserved = Some(vec![1, 2, 3]);
        snapshot
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips() {
        let store = MemorySnapshotStore::new();
        let snapshot = sample("orders");

        store.save(&snapshot).await.unwrap();
        let loaded = store.get("orders").await.unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.rows[0].columns["id"], ColumnValue::Int(1));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemorySnapshotStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_existing_snapshot() {
        let store = MemorySnapshotStore::new();
        let mut snapshot = sample("orders");
        store.save(&snapshot).await.unwrap();

        snapshot.rows.clear();
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.get("orders").await.unwrap().unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_and_delete() {
        let store = MemorySnapshotStore::new();
        store.save(&sample("b_table")).await.unwrap();
        store.save(&sample("a_table")).await.unwrap();

        let names: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.table_name)
            .collect();
        assert_eq!(names, vec!["a_table".to_string(), "b_table".to_string()]);

        assert!(store.delete("a_table").await.unwrap());
        assert!(!store.delete("a_table").await.unwrap());
        assert!(store.delete_snapshot(&sample("b_table")).await.unwrap());
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
