//! Row list payload encoding
//!
//! Stores persist the row list as an opaque byte payload. The payload is JSON
//! with type-tagged values, so every value keeps its runtime type across a
//! save/load round trip.

use crate::error::MonitorResult;
use crate::models::RowRecord;

pub fn encode_rows(rows: &[RowRecord]) -> MonitorResult<Vec<u8>> {
    Ok(serde_json::to_vec(rows)?)
}

/// Decode a stored payload. A missing or empty payload is an empty row list.
pub fn decode_rows(payload: Option<&[u8]>) -> MonitorResult<Vec<RowRecord>> {
    match payload {
        Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(bytes)?),
        _ => Ok(Vec::new()),
    }
}
