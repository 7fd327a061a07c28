// Primary Key Inspector
//
// Reads catalog metadata for a table and extracts its ordered
// primary key columns. Read-only; never alters the schema.

use indexmap::IndexMap;
use serde::Serialize;

use crate::dialect::Dialect;
use crate::executor::{CatalogRow, DdlExecutor, ExecutorError};

/// A single column participating in the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryKeyColumn {
    pub name: String,

    /// Dialect-native type expression, e.g. `int(10) unsigned`.
    pub declared_type: String,

    pub auto_increment: bool,
}

/// Primary key columns in catalog order.
///
/// The order is the column order of every generated key and index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PrimaryKeySet(IndexMap<String, PrimaryKeyColumn>);

impl PrimaryKeySet {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, column: PrimaryKeyColumn) {
        self.0.insert(column.name.clone(), column);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PrimaryKeyColumn> {
        self.0.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Last key column in catalog order.
    pub fn last(&self) -> Option<&PrimaryKeyColumn> {
        self.0.values().last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimaryKeyColumn> {
        self.0.values()
    }

    pub fn auto_increment_columns(&self) -> impl Iterator<Item = &PrimaryKeyColumn> {
        self.0.values().filter(|c| c.auto_increment)
    }
}

impl FromIterator<PrimaryKeyColumn> for PrimaryKeySet {
    fn from_iter<T: IntoIterator<Item = PrimaryKeyColumn>>(iter: T) -> Self {
        let mut set = PrimaryKeySet::new();
        for column in iter {
            set.insert(column);
        }
        set
    }
}

/// Everything the transformer needs to know about an existing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCatalog {
    pub table: String,

    /// All column names in catalog order.
    pub columns: Vec<String>,

    pub primary_keys: PrimaryKeySet,
}

impl TableCatalog {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Errors raised while reading catalog metadata.
///
/// Variants stay distinct internally; all render as
/// "could not introspect table ...".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntrospectionError {
    #[error("could not introspect table `{table}`: catalog returned no rows")]
    EmptyCatalog { table: String },

    #[error("could not introspect table `{table}`: {source}")]
    Catalog {
        table: String,
        #[source]
        source: ExecutorError,
    },

    #[error("could not introspect table `{table}`: unsupported driver `{driver}`")]
    UnsupportedDialect { table: String, driver: String },
}

/// Catalog query listing a table's columns.
pub(crate) fn columns_query(dialect: &Dialect, table: &str) -> Option<String> {
    match dialect {
        Dialect::MySql => Some(format!("SHOW COLUMNS FROM {}", dialect.quote_ident(table))),
        Dialect::Sqlite => Some(format!("PRAGMA table_info({})", dialect.quote_ident(table))),
        Dialect::Unsupported(_) => None,
    }
}

/// Run the column catalog query, failing on an empty result.
pub(crate) fn load_column_rows<E: DdlExecutor + ?Sized>(
    executor: &mut E,
    dialect: &Dialect,
    table: &str,
) -> Result<Vec<CatalogRow>, IntrospectionError> {
    let sql = columns_query(dialect, table).ok_or_else(|| IntrospectionError::UnsupportedDialect {
        table: table.to_string(),
        driver: dialect.driver(),
    })?;

    let rows = executor
        .query(&sql)
        .map_err(|source| IntrospectionError::Catalog {
            table: table.to_string(),
            source,
        })?;

    if rows.is_empty() {
        return Err(IntrospectionError::EmptyCatalog {
            table: table.to_string(),
        });
    }

    Ok(rows.iter().map(CatalogRow::normalized).collect())
}

/// Inspect a table: all column names plus the ordered primary key.
///
/// An empty primary key is valid here; callers decide whether
/// that is acceptable.
pub fn inspect_table<E: DdlExecutor + ?Sized>(
    executor: &mut E,
    dialect: &Dialect,
    table: &str,
) -> Result<TableCatalog, IntrospectionError> {
    let rows = load_column_rows(executor, dialect, table)?;

    let mut columns = Vec::with_capacity(rows.len());
    let mut primary_keys = PrimaryKeySet::new();

    for row in &rows {
        let Some(column) = key_column(dialect, row) else {
            tracing::warn!(table, "skipping catalog row without a column name");
            continue;
        };
        columns.push(column.name.clone());
        if is_primary(dialect, row) {
            primary_keys.insert(column);
        }
    }

    Ok(TableCatalog {
        table: table.to_string(),
        columns,
        primary_keys,
    })
}

/// Discover the ordered primary key columns of a table.
pub fn discover_primary_keys<E: DdlExecutor + ?Sized>(
    executor: &mut E,
    dialect: &Dialect,
    table: &str,
) -> Result<PrimaryKeySet, IntrospectionError> {
    Ok(inspect_table(executor, dialect, table)?.primary_keys)
}

fn key_column(dialect: &Dialect, row: &CatalogRow) -> Option<PrimaryKeyColumn> {
    match dialect {
        Dialect::MySql => Some(PrimaryKeyColumn {
            name: row.text("field")?,
            declared_type: row.text("type").unwrap_or_default(),
            auto_increment: row
                .text("extra")
                .map(|e| e.to_ascii_lowercase().contains("auto_increment"))
                .unwrap_or(false),
        }),
        // The pragma does not report AUTOINCREMENT; the key is never rebuilt here.
        Dialect::Sqlite => Some(PrimaryKeyColumn {
            name: row.text("name")?,
            declared_type: row.text("type").unwrap_or_default(),
            auto_increment: false,
        }),
        Dialect::Unsupported(_) => None,
    }
}

fn is_primary(dialect: &Dialect, row: &CatalogRow) -> bool {
    match dialect {
        Dialect::MySql => row
            .text("key")
            .map(|k| k.to_ascii_lowercase().contains("pri"))
            .unwrap_or(false),
        Dialect::Sqlite => row.is_truthy("pk"),
        Dialect::Unsupported(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RecordingExecutor, SqliteExecutor};

    fn describe(field: &str, ty: &str, key: &str, extra: &str) -> CatalogRow {
        CatalogRow::new()
            .with("Field", field)
            .with("Type", ty)
            .with("Null", "NO")
            .with("Key", key)
            .with("Default", serde_json::Value::Null)
            .with("Extra", extra)
    }

    #[test]
    fn mysql_auto_increment_key_is_detected() {
        let mut exec = RecordingExecutor::new("mysql").with_catalog(
            "SHOW COLUMNS FROM `products`",
            vec![
                describe("id", "int(10) unsigned", "PRI", "auto_increment"),
                describe("name", "varchar(255)", "", ""),
            ],
        );

        let keys = discover_primary_keys(&mut exec, &Dialect::MySql, "products").unwrap();

        assert_eq!(keys.names(), ["id"]);
        let id = keys.get("id").unwrap();
        assert_eq!(id.declared_type, "int(10) unsigned");
        assert!(id.auto_increment);
    }

    #[test]
    fn mysql_composite_key_keeps_catalog_order() {
        let mut exec = RecordingExecutor::new("mysql").with_catalog(
            "SHOW COLUMNS",
            vec![
                describe("region", "varchar(8)", "PRI", ""),
                describe("label", "text", "MUL", ""),
                describe("sku", "varchar(32)", "pri", ""),
            ],
        );

        let catalog = inspect_table(&mut exec, &Dialect::MySql, "stock").unwrap();

        assert_eq!(catalog.columns, ["region", "label", "sku"]);
        assert_eq!(catalog.primary_keys.names(), ["region", "sku"]);
        assert_eq!(catalog.primary_keys.auto_increment_columns().count(), 0);
        assert_eq!(catalog.primary_keys.last().unwrap().name, "sku");
    }

    #[test]
    fn empty_catalog_is_an_introspection_error() {
        let mut exec = RecordingExecutor::new("mysql");
        let err = discover_primary_keys(&mut exec, &Dialect::MySql, "ghost").unwrap_err();

        assert!(matches!(err, IntrospectionError::EmptyCatalog { .. }));
        assert!(err.to_string().starts_with("could not introspect table `ghost`"));
    }

    #[test]
    fn table_without_key_yields_empty_set() {
        let mut exec = RecordingExecutor::new("mysql")
            .with_catalog("SHOW COLUMNS", vec![describe("note", "text", "", "")]);

        let keys = discover_primary_keys(&mut exec, &Dialect::MySql, "notes").unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn unsupported_dialect_cannot_be_inspected() {
        let mut exec = RecordingExecutor::new("pgsql");
        let dialect = Dialect::detect("pgsql");

        let err = discover_primary_keys(&mut exec, &dialect, "t").unwrap_err();
        assert!(matches!(err, IntrospectionError::UnsupportedDialect { .. }));
        assert!(exec.queries().is_empty());
    }

    #[test]
    fn sqlite_pragma_reports_composite_keys() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        exec.execute(
            "CREATE TABLE stock (region TEXT, label TEXT, sku TEXT, PRIMARY KEY (region, sku))",
        )
        .unwrap();

        let keys = discover_primary_keys(&mut exec, &Dialect::Sqlite, "stock").unwrap();

        assert_eq!(keys.names(), ["region", "sku"]);
        assert_eq!(keys.get("sku").unwrap().declared_type, "TEXT");
        assert!(keys.iter().all(|k| !k.auto_increment));
    }

    #[test]
    fn sqlite_missing_table_returns_no_rows() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        let err = discover_primary_keys(&mut exec, &Dialect::Sqlite, "ghost").unwrap_err();
        assert!(matches!(err, IntrospectionError::EmptyCatalog { .. }));
    }
}
