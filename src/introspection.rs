//! Schema Introspection Module
//!
//! Resolves the primary key and column list of a monitored table, and owns
//! identifier quoting for the SQL the detector builds from those names.

use crate::db::queries;
use crate::error::MonitorResult;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::debug;

const DEFAULT_SCHEMA: &str = "public";

/// Separator between key parts in a composite primary-key string
pub const KEY_SEPARATOR: &str = "|";

/// Rendering of a NULL key part. Escaping keeps it apart from the text `\N`.
pub const KEY_NULL: &str = r"\N";

/// Key part as the key expression renders it: `\` and the separator are
/// backslash-escaped, NULL becomes [`KEY_NULL`].
pub fn encode_key_part(value: Option<&str>) -> String {
    match value {
        Some(text) => text
            .replace('\\', r"\\")
            .replace(KEY_SEPARATOR, &format!(r"\{}", KEY_SEPARATOR)),
        None => KEY_NULL.to_string(),
    }
}

/// A table column and its PostgreSQL type name (`udt_name`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub type_name: String,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A possibly schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    /// Parse `schema.table` or `table`; unqualified names live in `public`.
    pub fn parse(table: &str) -> Self {
        match table.split_once('.') {
            Some((schema, name)) => Self {
                schema: schema.trim().to_string(),
                name: name.trim().to_string(),
            },
            None => Self {
                schema: DEFAULT_SCHEMA.to_string(),
                name: table.trim().to_string(),
            },
        }
    }

    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.name))
    }
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Schema lookups for a monitored table
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Declared primary-key columns, in key order. Empty if none.
    async fn primary_key_columns(&self, table: &str) -> MonitorResult<Vec<String>>;

    /// Every column of the table with its type, in a stable order.
    async fn columns(&self, table: &str) -> MonitorResult<Vec<TableColumn>>;

    fn quote_identifier(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    fn quote_table(&self, table: &str) -> String {
        TableRef::parse(table).quoted()
    }

    /// SQL expression rendering the key columns as one string.
    ///
    /// Each part is encoded as [`encode_key_part`] does, so distinct keys
    /// never render the same.
    fn key_expression(&self, columns: &[String]) -> String {
        let parts: Vec<String> = columns
            .iter()
            .map(|c| {
                format!(
                    r"coalesce(replace(replace(CAST({} AS text), '\', '\\'), '{sep}', '\{sep}'), '{null}')",
                    self.quote_identifier(c),
                    sep = KEY_SEPARATOR,
                    null = KEY_NULL,
                )
            })
            .collect();
        format!("concat_ws('{}', {})", KEY_SEPARATOR, parts.join(", "))
    }
}

/// Catalog backed by PostgreSQL `information_schema`
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: Pool,
}

impl PostgresCatalog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn query_columns(
        &self,
        query: &str,
        table: &str,
    ) -> MonitorResult<Vec<tokio_postgres::Row>> {
        let table_ref = TableRef::parse(table);
        let client = self.pool.get().await?;
        Ok(client
            .query(query, &[&table_ref.schema, &table_ref.name])
            .await?)
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn primary_key_columns(&self, table: &str) -> MonitorResult<Vec<String>> {
        let keys: Vec<String> = self
            .query_columns(queries::GET_PRIMARY_KEY_COLUMNS, table)
            .await?
            .iter()
            .map(|row| row.try_get("column_name"))
            .collect::<Result<_, _>>()?;
        debug!("Table {} declares primary key [{}]", table, keys.join(", "));
        Ok(keys)
    }

    async fn columns(&self, table: &str) -> MonitorResult<Vec<TableColumn>> {
        self.query_columns(queries::GET_COLUMNS, table)
            .await?
            .iter()
            .map(|row| -> MonitorResult<TableColumn> {
                Ok(TableColumn::new(
                    row.try_get::<_, String>("column_name")?,
                    row.try_get::<_, String>("udt_name")?,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCatalog;

    #[async_trait]
    impl Catalog for NoCatalog {
        async fn primary_key_columns(&self, _table: &str) -> MonitorResult<Vec<String>> {
            Ok(vec![])
        }

        async fn columns(&self, _table: &str) -> MonitorResult<Vec<TableColumn>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_parse_qualified_table() {
        let t = TableRef::parse("sales.orders");
        assert_eq!(t.schema, "sales");
        assert_eq!(t.name, "orders");
    }

    #[test]
    fn test_parse_unqualified_table_defaults_to_public() {
        let t = TableRef::parse("orders");
        assert_eq!(t.schema, "public");
        assert_eq!(t.quoted(), "\"public\".\"orders\"");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_default_key_expression() {
        let expr = NoCatalog.key_expression(&["tenant".to_string(), "id".to_string()]);
        assert_eq!(
            expr,
            r#"concat_ws('|', coalesce(replace(replace(CAST("tenant" AS text), '\', '\\'), '|', '\|'), '\N'), coalesce(replace(replace(CAST("id" AS text), '\', '\\'), '|', '\|'), '\N'))"#
        );
    }

    #[test]
    fn test_encode_key_part_keeps_parts_apart() {
        assert_eq!(encode_key_part(Some("42")), "42");
        assert_eq!(encode_key_part(Some("x|y")), r"x\|y");
        assert_eq!(encode_key_part(Some(r"a\b")), r"a\\b");
        assert_eq!(encode_key_part(None), r"\N");
        // the literal text \N is not NULL
        assert_ne!(encode_key_part(Some(r"\N")), encode_key_part(None));
        // an empty string is not NULL either
        assert_ne!(encode_key_part(Some("")), encode_key_part(None));
    }
}
