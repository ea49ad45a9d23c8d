//! Change Detector
//!
//! Runs one detection pass over a table: resolve the key, scan every row,
//! fingerprint it, diff against the previous snapshot and report the
//! differences. The previous snapshot is never modified; a new one is built
//! and returned for the caller to persist.

use crate::db::{has_native_conversion, RowSource};
use crate::error::{MonitorError, MonitorResult, QueryFailure};
use crate::events::EventSink;
use crate::introspection::{Catalog, TableColumn};
use crate::models::{Row, RowRecord, TableSnapshot};
use crate::snapshot::hash::row_hash;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Alias of the composite key in the row query
pub const PRIMARY_KEY_ALIAS: &str = "primary_key_column";

/// Event counts of a completed pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub rows_scanned: u64,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl PassSummary {
    pub fn has_changes(&self) -> bool {
        self.added + self.changed + self.removed > 0
    }
}

/// Resolved schema of a pass, kept for error diagnostics
#[derive(Default)]
struct PassContext {
    primary_keys: Vec<String>,
    columns: Vec<String>,
    query: Option<String>,
    rows_processed: u64,
}

/// Working copy of the snapshot rows during a pass
struct PassState<'a> {
    table: &'a str,
    primary_keys: &'a [String],
    sink: &'a dyn EventSink,
    records: Vec<RowRecord>,
    index: HashMap<String, usize>,
    rows_processed: u64,
    summary: PassSummary,
}

impl<'a> PassState<'a> {
    fn new(
        table: &'a str,
        snapshot: &TableSnapshot,
        primary_keys: &'a [String],
        sink: &'a dyn EventSink,
    ) -> Self {
        let records: Vec<RowRecord> = snapshot
            .rows
            .iter()
            .cloned()
            .map(|mut record| {
                record.seen = false;
                record
            })
            .collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, record)| (record.primary_key.clone(), i))
            .collect();

        Self {
            table,
            primary_keys,
            sink,
            records,
            index,
            rows_processed: 0,
            summary: PassSummary::default(),
        }
    }

    fn observe(&mut self, mut row: Row) -> MonitorResult<()> {
        let primary_key = row
            .take(PRIMARY_KEY_ALIAS)
            .ok_or_else(|| {
                MonitorError::Internal(format!("row is missing the {} column", PRIMARY_KEY_ALIAS))
            })?
            .canonical();
        let hash = row_hash(row.values());

        match self.index.get(&primary_key) {
            None => {
                let mut record = RowRecord::new(&primary_key, hash, row.restrict_to(self.primary_keys));
                record.seen = true;
                self.index.insert(primary_key, self.records.len());
                self.records.push(record);
                self.summary.added += 1;
                self.sink.added(self.table, row.to_values());
            }
            Some(&i) => {
                let record = &mut self.records[i];
                record.seen = true;
                if record.hash != hash {
                    record.hash = hash;
                    record.columns = row.restrict_to(self.primary_keys);
                    self.summary.changed += 1;
                    self.sink.changed(self.table, row.to_values());
                }
            }
        }

        self.rows_processed += 1;
        Ok(())
    }

    /// Report unseen records as removed and keep only seen ones
    fn finish(mut self) -> (Vec<RowRecord>, PassSummary) {
        let mut kept = Vec::with_capacity(self.records.len());
        for mut record in self.records.drain(..) {
            if record.seen {
                record.seen = false;
                kept.push(record);
            } else {
                self.summary.removed += 1;
                self.sink.removed(self.table, record.columns);
            }
        }
        self.summary.rows_scanned = self.rows_processed;
        (kept, self.summary)
    }
}

/// Snapshot-diff change detector
pub struct ChangeDetector {
    catalog: Arc<dyn Catalog>,
    rows: Arc<dyn RowSource>,
}

impl ChangeDetector {
    pub fn new(catalog: Arc<dyn Catalog>, rows: Arc<dyn RowSource>) -> Self {
        Self { catalog, rows }
    }

    /// Run one pass and return the updated snapshot.
    ///
    /// Events reach `sink` while rows are read. On failure the input snapshot
    /// is left as it was and should not be persisted.
    pub async fn process(
        &self,
        snapshot: &TableSnapshot,
        sink: &dyn EventSink,
    ) -> MonitorResult<TableSnapshot> {
        self.process_with_summary(snapshot, sink)
            .await
            .map(|(snapshot, _)| snapshot)
    }

    /// Like [`process`](Self::process), also returning the event counts
    pub async fn process_with_summary(
        &self,
        snapshot: &TableSnapshot,
        sink: &dyn EventSink,
    ) -> MonitorResult<(TableSnapshot, PassSummary)> {
        let mut ctx = PassContext::default();

        match self.run(snapshot, sink, &mut ctx).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => Err(MonitorError::Query(Box::new(QueryFailure {
                table: snapshot.table_name.clone(),
                rows_processed: ctx.rows_processed,
                primary_keys: ctx.primary_keys,
                columns: ctx.columns,
                query: ctx.query,
                source: e,
            }))),
        }
    }

    async fn run(
        &self,
        snapshot: &TableSnapshot,
        sink: &dyn EventSink,
        ctx: &mut PassContext,
    ) -> MonitorResult<(TableSnapshot, PassSummary)> {
        let table = snapshot.table_name.as_str();

        ctx.primary_keys = self.resolve_primary_keys(snapshot).await?;
        for key in &ctx.primary_keys {
            debug!("Primary key: {}", key);
        }

        let columns = self.catalog.columns(table).await?;
        ctx.columns = columns.iter().map(|c| c.name.clone()).collect();

        let query = self.build_query(table, &ctx.primary_keys, &columns);
        debug!("Row query for {}: {}", table, query);
        ctx.query = Some(query.clone());

        let mut state = PassState::new(table, snapshot, &ctx.primary_keys, sink);
        let scanned = self
            .rows
            .scan(&query, &mut |row: Row| state.observe(row))
            .await;
        ctx.rows_processed = state.rows_processed;
        scanned?;

        let (rows, summary) = state.finish();

        info!(
            "Pass over {} complete: {} rows, {} added, {} changed, {} removed",
            table, summary.rows_scanned, summary.added, summary.changed, summary.removed
        );

        let updated = TableSnapshot {
            table_name: snapshot.table_name.clone(),
            created_at: snapshot.created_at,
            updated_at: Utc::now(),
            primary_key_override: snapshot.primary_key_override.clone(),
            rows,
            reserved: snapshot.reserved.clone(),
        };
        Ok((updated, summary))
    }

    /// Catalog keys followed by the override columns.
    ///
    /// The two lists are concatenated, so a column named in both appears
    /// twice.
    async fn resolve_primary_keys(&self, snapshot: &TableSnapshot) -> MonitorResult<Vec<String>> {
        let mut keys = self
            .catalog
            .primary_key_columns(&snapshot.table_name)
            .await?;
        keys.extend(snapshot.override_columns());

        if keys.is_empty() {
            return Err(MonitorError::Configuration(format!(
                "The table {} has no primary columns.",
                snapshot.table_name
            )));
        }
        Ok(keys)
    }

    /// Columns without a native value type are selected as text
    fn select_column(&self, column: &TableColumn) -> String {
        let quoted = self.catalog.quote_identifier(&column.name);
        if has_native_conversion(&column.type_name) {
            quoted
        } else {
            format!("CAST({} AS text) AS {}", quoted, quoted)
        }
    }

    fn build_query(&self, table: &str, primary_keys: &[String], columns: &[TableColumn]) -> String {
        let quote = |names: &[String]| {
            names
                .iter()
                .map(|c| self.catalog.quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let select_list: String = columns
            .iter()
            .map(|c| format!(", {}", self.select_column(c)))
            .collect();

        format!(
            "SELECT {} AS {}{} FROM {} ORDER BY {}",
            self.catalog.key_expression(primary_keys),
            PRIMARY_KEY_ALIAS,
            select_list,
            self.catalog.quote_table(table),
            quote(primary_keys),
        )
    }
}
