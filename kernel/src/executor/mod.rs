// DDL Executor Abstraction
//
// Defines the contract for whatever runs SQL against the target
// database. The transformer never talks to a driver directly.
//
// Implementations may wrap a live connection, a pool, or a
// recording stub used for offline planning.

mod memory;
mod sqlite;

pub use memory::RecordingExecutor;
pub use sqlite::SqliteExecutor;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of catalog metadata, keyed by field name.
///
/// Field order is the order the catalog reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRow(IndexMap<String, Value>);

impl CatalogRow {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Copy of this row with every field name lowercased.
    ///
    /// Catalogs disagree on casing (`Field` vs `field`).
    pub fn normalized(&self) -> CatalogRow {
        CatalogRow(
            self.0
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field value rendered as text. `NULL` and missing fields yield `None`.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Whether the field holds a truthy flag (`1`, `true`, non-zero text).
    pub fn is_truthy(&self, field: &str) -> bool {
        match self.0.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => {
                let s = s.trim();
                !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
            }
            _ => false,
        }
    }

    /// Integer value of a field, if it holds one.
    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Driver-level failure. The message is the driver's own text.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    pub sql: String,
    pub message: String,
}

impl ExecutorError {
    pub fn new(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            message: message.into(),
        }
    }
}

/// Runs raw SQL and catalog queries against a database.
///
/// Implementations MUST:
/// - Report the driver identifier of the underlying connection
/// - Execute statements in the order they are submitted
/// - Surface driver errors without retrying
pub trait DdlExecutor {
    /// Driver identifier, e.g. `mysql` or `sqlite`.
    fn driver_name(&self) -> &str;

    /// Execute one or more statements that return no rows.
    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError>;

    /// Run a catalog query and return its rows.
    fn query(&mut self, sql: &str) -> Result<Vec<CatalogRow>, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_lowercases_field_names() {
        let row = CatalogRow::new()
            .with("Field", "id")
            .with("Key", "PRI")
            .normalized();

        assert_eq!(row.text("field").as_deref(), Some("id"));
        assert_eq!(row.text("key").as_deref(), Some("PRI"));
        assert!(row.get("Field").is_none());
    }

    #[test]
    fn truthiness_follows_catalog_conventions() {
        let row = CatalogRow::new()
            .with("a", 1)
            .with("b", 0)
            .with("c", "1")
            .with("d", Value::Null)
            .with("e", true);

        assert!(row.is_truthy("a"));
        assert!(!row.is_truthy("b"));
        assert!(row.is_truthy("c"));
        assert!(!row.is_truthy("d"));
        assert!(row.is_truthy("e"));
        assert!(!row.is_truthy("missing"));
    }

    #[test]
    fn rows_deserialize_from_catalog_dumps() {
        let json = r#"
        [
          { "Field": "id", "Type": "int(10) unsigned", "Null": "NO", "Key": "PRI", "Default": null, "Extra": "auto_increment" }
        ]
        "#;

        let rows: Vec<CatalogRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("Type").as_deref(), Some("int(10) unsigned"));
        assert_eq!(rows[0].text("Default"), None);
    }
}
