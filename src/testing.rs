//! In-memory table used by unit tests in place of a database

use crate::db::{RowSource, RowVisitor};
use crate::error::{MonitorError, MonitorResult};
use crate::introspection::{encode_key_part, Catalog, TableColumn, KEY_SEPARATOR};
use crate::models::{ColumnValue, Row};
use async_trait::async_trait;
use std::sync::Mutex;

/// A single table serving both catalog lookups and row scans.
///
/// The composite key of each scanned row is built from the columns in the
/// query's `ORDER BY` clause, which is the resolved key column list, and
/// encoded the way the catalog's key expression renders it.
#[derive(Default)]
pub struct FakeTable {
    primary_keys: Vec<String>,
    columns: Vec<TableColumn>,
    rows: Mutex<Vec<Vec<ColumnValue>>>,
    fail_after: Mutex<Option<usize>>,
    fail_catalog: bool,
    queries: Mutex<Vec<String>>,
}

impl FakeTable {
    pub fn new(primary_keys: &[&str], columns: &[&str]) -> Self {
        Self {
            primary_keys: primary_keys.iter().map(|s| s.to_string()).collect(),
            columns: columns.iter().map(|s| TableColumn::new(*s, "text")).collect(),
            ..Default::default()
        }
    }

    /// Report `column` with a different catalog type
    pub fn with_column_type(mut self, column: &str, type_name: &str) -> Self {
        for c in self.columns.iter_mut().filter(|c| c.name == column) {
            c.type_name = type_name.to_string();
        }
        self
    }

    pub fn with_failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    pub fn set_rows(&self, rows: Vec<Vec<ColumnValue>>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Make the next scans fail after `rows` rows were delivered
    pub fn fail_after(&self, rows: usize) {
        *self.fail_after.lock().unwrap() = Some(rows);
    }

    pub fn last_query(&self) -> Option<String> {
        self.queries.lock().unwrap().last().cloned()
    }

    fn key_columns(sql: &str) -> Vec<String> {
        sql.rsplit_once("ORDER BY ")
            .map(|(_, list)| {
                list.split(", ")
                    .map(|c| c.trim().trim_matches('"').to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Catalog for FakeTable {
    async fn primary_key_columns(&self, _table: &str) -> MonitorResult<Vec<String>> {
        if self.fail_catalog {
            return Err(MonitorError::Internal("catalog unavailable".to_string()));
        }
        Ok(self.primary_keys.clone())
    }

    async fn columns(&self, _table: &str) -> MonitorResult<Vec<TableColumn>> {
        Ok(self.columns.clone())
    }
}

#[async_trait]
impl RowSource for FakeTable {
    async fn scan(&self, sql: &str, visit: &mut RowVisitor<'_>) -> MonitorResult<u64> {
        self.queries.lock().unwrap().push(sql.to_string());
        let key_columns = Self::key_columns(sql);
        let rows = self.rows.lock().unwrap().clone();
        let fail_after = *self.fail_after.lock().unwrap();

        let mut visited = 0u64;
        for values in rows {
            if fail_after == Some(visited as usize) {
                return Err(MonitorError::Internal("connection reset".to_string()));
            }

            let key = key_columns
                .iter()
                .map(|k| {
                    let value = self
                        .columns
                        .iter()
                        .position(|c| c.name.eq_ignore_ascii_case(k))
                        .map(|i| &values[i])
                        .filter(|v| !v.is_null())
                        .map(ColumnValue::canonical);
                    encode_key_part(value.as_deref())
                })
                .collect::<Vec<_>>()
                .join(KEY_SEPARATOR);

            let mut row = Row::with_capacity(values.len() + 1);
            row.push("primary_key_column", ColumnValue::Text(key));
            for (column, value) in self.columns.iter().zip(values) {
                row.push(column.name.clone(), value);
            }
            visit(row)?;
            visited += 1;
        }
        Ok(visited)
    }
}

/// Shorthand for a `(id, name)` row
pub fn id_name(id: i64, name: &str) -> Vec<ColumnValue> {
    vec![ColumnValue::Int(id), ColumnValue::from(name)]
}
