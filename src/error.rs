//! Error handling module
//!
//! Provides the error type shared by the detector, the stores and the admin API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The table has no usable primary key. Fix the monitor configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query error: {0}")]
    Query(Box<QueryFailure>),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported type {type_name} in column {column}")]
    UnsupportedType { column: String, type_name: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, MonitorError::Configuration(_))
    }

    /// Diagnostics of a failed pass, if this is a query failure
    pub fn query_failure(&self) -> Option<&QueryFailure> {
        match self {
            MonitorError::Query(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Diagnostic context of a pass that failed while talking to the database
#[derive(Debug)]
pub struct QueryFailure {
    pub table: String,
    pub rows_processed: u64,
    pub primary_keys: Vec<String>,
    pub columns: Vec<String>,
    /// Row query text, absent when the failure happened before it was built
    pub query: Option<String>,
    pub source: MonitorError,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table {} failed after {} rows (primary keys: [{}], columns: [{}]",
            self.table,
            self.rows_processed,
            self.primary_keys.join(", "),
            self.columns.join(", "),
        )?;
        if let Some(query) = &self.query {
            write!(f, ", query: {}", query)?;
        }
        write!(f, "): {}", self.source)
    }
}

impl std::error::Error for QueryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            MonitorError::Configuration(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONFIGURATION_ERROR",
                msg.clone(),
                None,
            ),
            MonitorError::Query(failure) => {
                error!("Query error: {}", failure);
                (
                    StatusCode::BAD_GATEWAY,
                    "QUERY_ERROR",
                    format!("Change detection failed for table {}", failure.table),
                    Some(failure.to_string()),
                )
            }
            MonitorError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            MonitorError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            MonitorError::Serialization(e) => {
                error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERIALIZATION_ERROR",
                    "Stored snapshot could not be decoded".to_string(),
                    Some(e.to_string()),
                )
            }
            MonitorError::UnsupportedType { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNSUPPORTED_TYPE",
                self.to_string(),
                None,
            ),
            MonitorError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            MonitorError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            MonitorError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result alias used across the crate
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> MonitorError {
    MonitorError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> MonitorError {
    MonitorError::NotFound(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failure_display_carries_context() {
        let err = MonitorError::Query(Box::new(QueryFailure {
            table: "orders".to_string(),
            rows_processed: 12,
            primary_keys: vec!["id".to_string()],
            columns: vec!["id".to_string(), "total".to_string()],
            query: Some("SELECT 1".to_string()),
            source: MonitorError::Internal("connection reset".to_string()),
        }));

        let text = err.to_string();
        assert!(text.contains("orders"));
        assert!(text.contains("12 rows"));
        assert!(text.contains("id, total"));
        assert!(text.contains("SELECT 1"));
        assert!(text.contains("connection reset"));
        assert!(err.query_failure().is_some());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_status_codes() {
        let resp = MonitorError::NotFound("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = MonitorError::Configuration("no key".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resp = validation_error("bad").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
