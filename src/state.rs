//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::events::EventSink;
use crate::service::TableMonitorService;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    pub service: Arc<TableMonitorService>,

    /// Also receives the events of on-demand passes
    pub sink: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(service: Arc<TableMonitorService>, sink: Arc<dyn EventSink>) -> Self {
        Self { service, sink }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
