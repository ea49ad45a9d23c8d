//! Table snapshot model
//!
//! A `TableSnapshot` is the persisted picture of a table's rows as of the
//! last successful pass. Only primary-key columns and a content hash are kept
//! per row.

use crate::models::value::RowValues;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state of one monitored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Extra primary-key columns, comma or semicolon separated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_override: Option<String>,
    #[serde(default)]
    pub rows: Vec<RowRecord>,
    /// Opaque caller-owned blob, stored as is
    #[serde(skip)]
    pub reserved: Option<Vec<u8>>,
}

impl TableSnapshot {
    /// Empty snapshot for a table that has never been processed
    pub fn new(table_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            table_name: table_name.into(),
            created_at: now,
            updated_at: now,
            primary_key_override: None,
            rows: Vec::new(),
            reserved: None,
        }
    }

    pub fn with_primary_key_override(mut self, columns: impl Into<String>) -> Self {
        self.primary_key_override = Some(columns.into());
        self
    }

    /// Override column names: split on `,` and `;`, trimmed, empties dropped.
    pub fn override_columns(&self) -> Vec<String> {
        self.primary_key_override
            .as_deref()
            .map(|raw| {
                raw.split(&[',', ';'][..])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find_row(&self, primary_key: &str) -> Option<&RowRecord> {
        self.rows.iter().find(|r| r.primary_key == primary_key)
    }
}

/// Last observed state of a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRecord {
    pub primary_key: String,
    pub hash: String,
    /// Primary-key columns only
    pub columns: RowValues,
    /// Set while a pass is running, never persisted
    #[serde(skip)]
    pub seen: bool,
}

impl RowRecord {
    pub fn new(primary_key: impl Into<String>, hash: impl Into<String>, columns: RowValues) -> Self {
        Self {
            primary_key: primary_key.into(),
            hash: hash.into(),
            columns,
            seen: false,
        }
    }
}
