//! SQL query constants
//!
//! Catalog lookups and snapshot persistence statements. Row queries are
//! built per pass by the detector.

/// Primary key columns of a table, in key order
pub const GET_PRIMARY_KEY_COLUMNS: &str = r#"
    SELECT kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        AND tc.table_name = $2
    ORDER BY kcu.ordinal_position
"#;

/// All columns of a table with their type names, in ordinal order
pub const GET_COLUMNS: &str = r#"
    SELECT c.column_name::text AS column_name, c.udt_name::text AS udt_name
    FROM information_schema.columns c
    WHERE c.table_schema = $1
        AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

/// Snapshot table DDL, `{table}` replaced by the quoted store table name
pub const CREATE_SNAPSHOT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS {table} (
        table_name VARCHAR(255) PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        primary_key_override TEXT,
        row_data BYTEA,
        reserved BYTEA
    )
"#;

pub const SELECT_SNAPSHOT: &str = r#"
    SELECT table_name, created_at, updated_at, primary_key_override, row_data, reserved
    FROM {table}
    WHERE table_name = $1
"#;

pub const SELECT_ALL_SNAPSHOTS: &str = r#"
    SELECT table_name, created_at, updated_at, primary_key_override, row_data, reserved
    FROM {table}
    ORDER BY table_name
"#;

pub const UPSERT_SNAPSHOT: &str = r#"
    INSERT INTO {table} (table_name, created_at, updated_at, primary_key_override, row_data, reserved)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (table_name) DO UPDATE SET
        updated_at = EXCLUDED.updated_at,
        primary_key_override = EXCLUDED.primary_key_override,
        row_data = EXCLUDED.row_data,
        reserved = EXCLUDED.reserved
"#;

pub const DELETE_SNAPSHOT: &str = r#"
    DELETE FROM {table} WHERE table_name = $1
"#;

/// Substitute the quoted store table name into a statement template
pub fn with_table(template: &str, quoted_table: &str) -> String {
    template.replace("{table}", quoted_table)
}
