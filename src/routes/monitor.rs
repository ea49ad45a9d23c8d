//! Monitor route handlers

use crate::error::{validation_error, MonitorResult};
use crate::events::{CollectingSink, EventSink, FanoutSink};
use crate::models::{
    validate_table_name, MonitorInfo, MonitorListResponse, ProcessResponse, SuccessResponse,
    TableSnapshot, UpsertMonitorRequest,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

/// List every monitored table
pub async fn list_monitors(
    State(state): State<SharedState>,
) -> MonitorResult<Json<SuccessResponse<MonitorListResponse>>> {
    let monitors: Vec<MonitorInfo> = state
        .service
        .get_all()
        .await?
        .iter()
        .map(MonitorInfo::from)
        .collect();

    Ok(Json(SuccessResponse::with_data(
        format!("{} monitored tables", monitors.len()),
        MonitorListResponse { monitors },
    )))
}

/// Full snapshot of one table, rows included
pub async fn get_monitor(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> MonitorResult<Json<SuccessResponse<TableSnapshot>>> {
    validate_table_name(&table)?;
    let snapshot = state.service.require(&table).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Snapshot of {}", table),
        snapshot,
    )))
}

/// Create a monitor or change its key override
pub async fn upsert_monitor(
    State(state): State<SharedState>,
    Path(table): Path<String>,
    Json(payload): Json<UpsertMonitorRequest>,
) -> MonitorResult<Json<SuccessResponse<MonitorInfo>>> {
    validate_table_name(&table)?;
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    debug!("Configuring monitor for {}", table);
    let snapshot = state
        .service
        .configure(&table, payload.primary_key_override)
        .await?;

    info!("Monitor for table {} saved", table);
    Ok(Json(SuccessResponse::with_data(
        format!("Monitor for {} saved.", table),
        MonitorInfo::from(&snapshot),
    )))
}

/// Stop monitoring a table and drop its snapshot
pub async fn delete_monitor(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> MonitorResult<Json<SuccessResponse<()>>> {
    validate_table_name(&table)?;
    let snapshot = state.service.require(&table).await?;
    state.service.delete_snapshot(&snapshot).await?;

    Ok(Json(SuccessResponse::message_only(format!(
        "Monitor for {} deleted.",
        table
    ))))
}

/// Run a pass now and return its events
pub async fn process_monitor(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> MonitorResult<Json<SuccessResponse<ProcessResponse>>> {
    validate_table_name(&table)?;

    let collected = Arc::new(CollectingSink::new());
    let sink = FanoutSink::new()
        .with(collected.clone())
        .with(state.sink.clone());

    let (snapshot, summary) = state
        .service
        .run_pass_with(&table, &sink as &dyn EventSink)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Processed {} rows of {}", summary.rows_scanned, table),
        ProcessResponse {
            monitor: MonitorInfo::from(&snapshot),
            summary,
            events: collected.take(),
        },
    )))
}
