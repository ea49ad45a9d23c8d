//! Row fingerprints
//!
//! A row hash is a SHA-256 over the canonical string form of each value,
//! joined with `;`. Column order must be the same on every pass, which holds
//! as long as the row query always selects the same ordered column list.

use crate::models::ColumnValue;
use sha2::{Digest, Sha256};

const SEPARATOR: &str = ";";

/// Fingerprint an ordered sequence of values.
///
/// Returns an empty string for an empty sequence.
pub fn row_hash<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a ColumnValue>,
{
    let mut values = values.into_iter().peekable();
    if values.peek().is_none() {
        return String::new();
    }

    let joined = values
        .map(ColumnValue::canonical)
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let values = vec![ColumnValue::Int(1), ColumnValue::from("a")];
        assert_eq!(row_hash(&values), row_hash(&values));
        assert_eq!(row_hash(&values).len(), 64);
    }

    #[test]
    fn test_digest_of_joined_values() {
        let values = vec![ColumnValue::Int(1), ColumnValue::from("a")];
        let expected = format!("{:x}", Sha256::digest(b"1;a"));
        assert_eq!(row_hash(&values), expected);
    }

    #[test]
    fn test_order_matters() {
        let ab = vec![ColumnValue::from("a"), ColumnValue::from("b")];
        let ba = vec![ColumnValue::from("b"), ColumnValue::from("a")];
        assert_ne!(row_hash(&ab), row_hash(&ba));
    }

    #[test]
    fn test_null_hashes_like_empty_string() {
        let with_null = vec![ColumnValue::Int(1), ColumnValue::Null];
        let with_empty = vec![ColumnValue::Int(1), ColumnValue::from("")];
        assert_eq!(row_hash(&with_null), row_hash(&with_empty));
    }

    #[test]
    fn test_value_change_changes_hash() {
        let before = vec![ColumnValue::Int(2), ColumnValue::from("b")];
        let after = vec![ColumnValue::Int(2), ColumnValue::from("b2")];
        assert_ne!(row_hash(&before), row_hash(&after));
    }

    #[test]
    fn test_empty_row_has_empty_hash() {
        let empty: Vec<ColumnValue> = vec![];
        assert_eq!(row_hash(&empty), "");
    }
}
