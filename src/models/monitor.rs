//! Admin API request and response types

use crate::error::{validation_error, MonitorResult};
use crate::events::RowEvent;
use crate::models::TableSnapshot;
use crate::snapshot::PassSummary;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `table` or `schema.table`, plain identifiers only
static TABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$")
        .expect("table name pattern is valid")
});

/// Reject table names that are not plain identifiers
pub fn validate_table_name(name: &str) -> MonitorResult<()> {
    if name.len() > 127 || !TABLE_NAME.is_match(name) {
        return Err(validation_error(format!(
            "Invalid table name '{}'. Use table or schema.table with letters, digits and underscores.",
            name
        )));
    }
    Ok(())
}

/// Create or update a monitor
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMonitorRequest {
    /// Extra key columns, comma or semicolon separated
    #[validate(length(max = 1024, message = "Primary key override is too long"))]
    pub primary_key_override: Option<String>,
}

/// Snapshot metadata without the row list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInfo {
    pub table_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key_override: Option<String>,
    pub row_count: usize,
}

impl From<&TableSnapshot> for MonitorInfo {
    fn from(snapshot: &TableSnapshot) -> Self {
        Self {
            table_name: snapshot.table_name.clone(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            primary_key_override: snapshot.primary_key_override.clone(),
            row_count: snapshot.rows.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorListResponse {
    pub monitors: Vec<MonitorInfo>,
}

/// Result of an on-demand pass
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub monitor: MonitorInfo,
    pub summary: PassSummary,
    pub events: Vec<RowEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RowRecord, RowValues};

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("orders").is_ok());
        assert!(validate_table_name("sales.orders_2024").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1orders").is_err());
        assert!(validate_table_name("orders; DROP TABLE x").is_err());
        assert!(validate_table_name("a.b.c").is_err());
    }

    #[test]
    fn test_upsert_request_length_limit() {
        let ok = UpsertMonitorRequest {
            primary_key_override: Some("tenant_id, region".to_string()),
        };
        assert!(ok.validate().is_ok());

        let too_long = UpsertMonitorRequest {
            primary_key_override: Some("c".repeat(2000)),
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_monitor_info_counts_rows() {
        let mut snapshot = TableSnapshot::new("orders");
        snapshot.rows.push(RowRecord::new("1", "h", RowValues::new()));
        let info = MonitorInfo::from(&snapshot);
        assert_eq!(info.row_count, 1);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tableName"], "orders");
        assert!(json.get("primaryKeyOverride").is_none());
    }
}
