//! Data models
//!
//! Snapshot records, typed column values and the response envelopes used by
//! the admin API.

pub mod monitor;
pub mod snapshot;
pub mod value;

pub use monitor::{
    validate_table_name, MonitorInfo, MonitorListResponse, ProcessResponse, UpsertMonitorRequest,
};
pub use snapshot::{RowRecord, TableSnapshot};
pub use value::{ColumnValue, Row, RowValues};

use serde::Serialize;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl SuccessResponse<()> {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
