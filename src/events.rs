//! Row change notifications
//!
//! The detector reports every added, changed or removed row to an
//! [`EventSink`] as soon as it is observed.

use crate::models::RowValues;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One affected row.
///
/// For `Added` and `Changed` the row holds every selected column; for
/// `Removed` it holds the last known primary-key columns only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowEvent {
    pub kind: ChangeKind,
    pub table_name: String,
    pub row: RowValues,
}

impl RowEvent {
    pub fn new(kind: ChangeKind, table_name: impl Into<String>, row: RowValues) -> Self {
        Self {
            kind,
            table_name: table_name.into(),
            row,
        }
    }
}

/// Receiver of row change notifications
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: RowEvent);

    fn added(&self, table_name: &str, row: RowValues) {
        self.on_event(RowEvent::new(ChangeKind::Added, table_name, row));
    }

    fn changed(&self, table_name: &str, row: RowValues) {
        self.on_event(RowEvent::new(ChangeKind::Changed, table_name, row));
    }

    fn removed(&self, table_name: &str, row: RowValues) {
        self.on_event(RowEvent::new(ChangeKind::Removed, table_name, row));
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<RowEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the collected events
    pub fn take(&self) -> Vec<RowEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn on_event(&self, event: RowEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards events to an unbounded queue consumed by the caller
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RowEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: RowEvent) {
        if self.tx.send(event).is_err() {
            warn!("Row event dropped, receiver closed");
        }
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: RowEvent) {
        let row = serde_json::to_string(&event.row).unwrap_or_default();
        info!(table = %event.table_name, kind = ?event.kind, %row, "Row event");
    }
}

/// Sends each event to several sinks in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn on_event(&self, event: RowEvent) {
        for sink in &self.sinks {
            sink.on_event(event.clone());
        }
    }
}
