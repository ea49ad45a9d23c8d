//! Background polling
//!
//! One task per configured table runs a pass every interval. A failed pass
//! is logged and the next tick runs as usual.

use crate::service::TableMonitorService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Start a polling task for each table. The first pass runs immediately.
pub fn spawn_pollers(
    service: Arc<TableMonitorService>,
    tables: &[String],
    interval: Duration,
) -> Vec<JoinHandle<()>> {
    tables
        .iter()
        .map(|table| {
            info!("Polling table {} every {:?}", table, interval);
            tokio::spawn(poll_table(service.clone(), table.clone(), interval))
        })
        .collect()
}

async fn poll_table(service: Arc<TableMonitorService>, table: String, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match service.run_pass(&table).await {
            Ok(summary) if summary.has_changes() => info!(
                "Table {}: {} added, {} changed, {} removed",
                table, summary.added, summary.changed, summary.removed
            ),
            Ok(_) => {}
            Err(e) if e.is_configuration() => {
                warn!("Table {} is misconfigured: {}", table, e)
            }
            Err(e) => error!("Pass over table {} failed: {}", table, e),
        }
    }
}
