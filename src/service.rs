//! Table monitor service
//!
//! Ties the change detector to the snapshot store: loads the previous
//! snapshot of a table, runs a pass and persists the result. Passes over the
//! same table never overlap.

use crate::error::{not_found_error, MonitorResult};
use crate::events::EventSink;
use crate::models::TableSnapshot;
use crate::snapshot::{ChangeDetector, PassSummary, SnapshotStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct TableMonitorService {
    detector: ChangeDetector,
    store: Arc<dyn SnapshotStore>,
    /// Receives the events of background passes
    sink: Arc<dyn EventSink>,
    /// Table name -> pass lock
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableMonitorService {
    pub fn new(
        detector: ChangeDetector,
        store: Arc<dyn SnapshotStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            detector,
            store,
            sink,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, table_name: &str) -> MonitorResult<Option<TableSnapshot>> {
        self.store.get(table_name).await
    }

    pub async fn get_all(&self) -> MonitorResult<Vec<TableSnapshot>> {
        self.store.get_all().await
    }

    /// Persist a snapshot, stamping `updated_at`
    pub async fn save(&self, snapshot: TableSnapshot) -> MonitorResult<TableSnapshot> {
        let table_name = snapshot.table_name.clone();
        let lock = self.lock_for(&table_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.save_stamped(snapshot).await
        };
        self.release(&table_name, lock).await;
        result
    }

    pub async fn delete(&self, table_name: &str) -> MonitorResult<bool> {
        let lock = self.lock_for(table_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.store.delete(table_name).await
        };
        self.release(table_name, lock).await;

        if let Ok(true) = result {
            info!("Stopped monitoring table {}", table_name);
        }
        result
    }

    pub async fn delete_snapshot(&self, snapshot: &TableSnapshot) -> MonitorResult<bool> {
        self.delete(&snapshot.table_name).await
    }

    /// Create the monitor for a table if needed and set its key override.
    ///
    /// Existing rows are kept. A blank override clears it.
    pub async fn configure(
        &self,
        table_name: &str,
        primary_key_override: Option<String>,
    ) -> MonitorResult<TableSnapshot> {
        let lock = self.lock_for(table_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.configure_locked(table_name, primary_key_override).await
        };
        self.release(table_name, lock).await;
        result
    }

    /// Run one pass, reporting to the service sink
    pub async fn run_pass(&self, table_name: &str) -> MonitorResult<PassSummary> {
        let sink = self.sink.clone();
        self.run_pass_with(table_name, sink.as_ref())
            .await
            .map(|(_, summary)| summary)
    }

    /// Run one pass over `table_name`, reporting to `sink`.
    ///
    /// A table without a stored snapshot starts from an empty one. The new
    /// snapshot is saved only when the pass succeeds.
    pub async fn run_pass_with(
        &self,
        table_name: &str,
        sink: &dyn EventSink,
    ) -> MonitorResult<(TableSnapshot, PassSummary)> {
        let lock = self.lock_for(table_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_pass_locked(table_name, sink).await
        };
        self.release(table_name, lock).await;
        result
    }

    /// Snapshot that must exist, as a `NotFound` error otherwise
    pub async fn require(&self, table_name: &str) -> MonitorResult<TableSnapshot> {
        self.get(table_name)
            .await?
            .ok_or_else(|| not_found_error(format!("Table {} is not monitored", table_name)))
    }

    async fn save_stamped(&self, mut snapshot: TableSnapshot) -> MonitorResult<TableSnapshot> {
        snapshot.updated_at = Utc::now();
        self.store.save(&snapshot).await?;
        Ok(snapshot)
    }

    async fn configure_locked(
        &self,
        table_name: &str,
        primary_key_override: Option<String>,
    ) -> MonitorResult<TableSnapshot> {
        let mut snapshot = self
            .store
            .get(table_name)
            .await?
            .unwrap_or_else(|| TableSnapshot::new(table_name));
        snapshot.primary_key_override = primary_key_override
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        debug!(
            "Configured table {} with key override {:?}",
            table_name, snapshot.primary_key_override
        );
        self.save_stamped(snapshot).await
    }

    async fn run_pass_locked(
        &self,
        table_name: &str,
        sink: &dyn EventSink,
    ) -> MonitorResult<(TableSnapshot, PassSummary)> {
        let previous = match self.store.get(table_name).await? {
            Some(snapshot) => snapshot,
            None => {
                debug!("No snapshot for {}, starting empty", table_name);
                TableSnapshot::new(table_name)
            }
        };

        let (updated, summary) = match self.detector.process_with_summary(&previous, sink).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Pass over {} failed, snapshot not saved: {}", table_name, e);
                return Err(e);
            }
        };

        self.store.save(&updated).await?;
        Ok((updated, summary))
    }

    async fn lock_for(&self, table_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(table_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the table's lock entry once nobody else holds or waits on it
    async fn release(&self, table_name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let idle = locks
            .get(table_name)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(table_name);
        }
    }

    #[cfg(test)]
    async fn tracked_tables(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::events::{ChangeKind, CollectingSink};
    use crate::snapshot::MemorySnapshotStore;
    use crate::testing::{id_name, FakeTable};
    use pretty_assertions::assert_eq;

    struct Fixture {
        table: Arc<FakeTable>,
        store: MemorySnapshotStore,
        sink: Arc<CollectingSink>,
        service: TableMonitorService,
    }

    fn fixture(primary_keys: &[&str]) -> Fixture {
        let table = Arc::new(FakeTable::new(primary_keys, &["id", "name"]));
        let store = MemorySnapshotStore::new();
        let sink = Arc::new(CollectingSink::new());
        let service = TableMonitorService::new(
            ChangeDetector::new(table.clone(), table.clone()),
            Arc::new(store.clone()),
            sink.clone(),
        );
        Fixture {
            table,
            store,
            sink,
            service,
        }
    }

    #[tokio::test]
    async fn test_run_pass_creates_and_persists_snapshot() {
        let f = fixture(&["id"]);
        f.table.set_rows(vec![id_name(1, "a"), id_name(2, "b")]);

        let summary = f.service.run_pass("orders").await.unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(f.sink.len(), 2);

        let stored = f.store.get("orders").await.unwrap().unwrap();
        assert_eq!(stored.rows.len(), 2);

        // Nothing changed: second pass is quiet
        f.sink.take();
        let summary = f.service.run_pass("orders").await.unwrap();
        assert!(!summary.has_changes());
        assert!(f.sink.is_empty());
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_previous_snapshot() {
        let f = fixture(&["id"]);
        f.table.set_rows(vec![id_name(1, "a")]);
        f.service.run_pass("orders").await.unwrap();
        let before = f.store.get("orders").await.unwrap().unwrap();

        f.table.set_rows(vec![id_name(1, "a"), id_name(2, "b")]);
        f.table.fail_after(1);
        let err = f.service.run_pass("orders").await.unwrap_err();
        assert!(err.query_failure().is_some());

        let after = f.store.get("orders").await.unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_persisted() {
        let f = fixture(&[]);
        f.table.set_rows(vec![id_name(1, "a")]);

        let err = f.service.run_pass("orders").await.unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert_eq!(f.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_configure_sets_override_used_by_next_pass() {
        let f = fixture(&[]);
        f.table.set_rows(vec![id_name(1, "a")]);

        let configured = f
            .service
            .configure("orders", Some(" id ".to_string()))
            .await
            .unwrap();
        assert_eq!(configured.primary_key_override.as_deref(), Some("id"));

        let (snapshot, summary) = f
            .service
            .run_pass_with("orders", f.sink.as_ref())
            .await
            .unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(snapshot.rows[0].primary_key, "1");
        assert_eq!(snapshot.primary_key_override.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn test_configure_blank_override_clears_it() {
        let f = fixture(&["id"]);
        f.service
            .configure("orders", Some("tenant".to_string()))
            .await
            .unwrap();
        let cleared = f
            .service
            .configure("orders", Some("  ".to_string()))
            .await
            .unwrap();
        assert_eq!(cleared.primary_key_override, None);
    }

    #[tokio::test]
    async fn test_run_pass_with_reports_to_given_sink_only() {
        let f = fixture(&["id"]);
        f.table.set_rows(vec![id_name(1, "a")]);

        let local = CollectingSink::new();
        f.service.run_pass_with("orders", &local).await.unwrap();

        let events = local.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Added);
        assert!(f.sink.is_empty());
    }

    #[tokio::test]
    async fn test_save_stamps_updated_at() {
        let f = fixture(&["id"]);
        let mut snapshot = TableSnapshot::new("orders");
        snapshot.updated_at = snapshot.created_at - chrono::Duration::hours(1);

        let saved = f.service.save(snapshot.clone()).await.unwrap();
        assert!(saved.updated_at > snapshot.updated_at);
        assert_eq!(f.service.get("orders").await.unwrap().unwrap(), saved);
    }

    #[tokio::test]
    async fn test_delete_and_require() {
        let f = fixture(&["id"]);
        f.service.save(TableSnapshot::new("orders")).await.unwrap();
        assert_eq!(f.service.get_all().await.unwrap().len(), 1);

        let snapshot = f.service.require("orders").await.unwrap();
        assert!(f.service.delete_snapshot(&snapshot).await.unwrap());
        assert!(!f.service.delete("orders").await.unwrap());
        assert!(matches!(
            f.service.require("orders").await,
            Err(MonitorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_passes_on_one_table_serialise() {
        let f = fixture(&["id"]);
        f.table.set_rows(vec![id_name(1, "a"), id_name(2, "b")]);
        let service = Arc::new(f.service);

        let a = tokio::spawn({
            let service = service.clone();
            async move { service.run_pass("orders").await }
        });
        let b = tokio::spawn({
            let service = service.clone();
            async move { service.run_pass("orders").await }
        });
        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        // Exactly one of the passes saw the rows as new
        assert_eq!(first.added + second.added, 2);
        assert_eq!(f.sink.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_entries_are_dropped_after_use() {
        let f = fixture(&["id"]);
        f.table.set_rows(vec![id_name(1, "a")]);

        f.service.run_pass("orders").await.unwrap();
        f.service.run_pass("customers").await.unwrap();
        f.service.configure("orders", None).await.unwrap();
        f.service.save(TableSnapshot::new("invoices")).await.unwrap();
        f.service.delete("orders").await.unwrap();
        let _ = f.service.run_pass("missing").await;

        assert_eq!(f.service.tracked_tables().await, 0);
    }

    #[tokio::test]
    async fn test_save_waits_for_running_pass() {
        let f = fixture(&["id"]);
        let service = Arc::new(f.service);

        // Stand in for a pass holding the table
        let lock = service.lock_for("orders").await;
        let guard = lock.lock().await;

        let save = tokio::spawn({
            let service = service.clone();
            async move { service.save(TableSnapshot::new("orders")).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!save.is_finished());
        assert_eq!(f.store.len().await, 0);

        drop(guard);
        save.await.unwrap().unwrap();
        service.release("orders", lock).await;

        assert_eq!(f.store.len().await, 1);
        assert_eq!(service.tracked_tables().await, 0);
    }
}
