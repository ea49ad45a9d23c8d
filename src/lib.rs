//! Tablewatch - snapshot-diff change detection for relational tables
//!
//! Each pass reads every row of a monitored table, fingerprints it, compares
//! the fingerprints with the previous snapshot and reports added, changed and
//! removed rows. Snapshots are persisted between passes.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod introspection;
pub mod models;
pub mod poller;
pub mod routes;
pub mod service;
pub mod state;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;
