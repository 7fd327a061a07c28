// SQLite executor backed by rusqlite.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;

use super::{CatalogRow, DdlExecutor, ExecutorError};

pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            ExecutorError::new(format!("open {}", path.display()), e.to_string())
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, ExecutorError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutorError::new("open :memory:", e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

impl DdlExecutor for SqliteExecutor {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| ExecutorError::new(sql, e.to_string()))
    }

    fn query(&mut self, sql: &str) -> Result<Vec<CatalogRow>, ExecutorError> {
        let err = |e: rusqlite::Error| ExecutorError::new(sql, e.to_string());

        let mut stmt = self.conn.prepare(sql).map_err(err)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut out = CatalogRow::new();
                for (idx, name) in names.iter().enumerate() {
                    out.insert(name, to_json(row.get_ref(idx)?));
                }
                Ok(out)
            })
            .map_err(err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pragma_rows_keep_catalog_field_names() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        exec.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT DEFAULT NULL)")
            .unwrap();

        let rows = exec.query("PRAGMA table_info(\"t\")").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("name").as_deref(), Some("id"));
        assert!(rows[0].is_truthy("pk"));
        assert!(!rows[1].is_truthy("pk"));
        assert_eq!(rows[1].text("dflt_value").as_deref(), Some("NULL"));
    }

    #[test]
    fn driver_errors_are_passed_through() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        let err = exec.execute("ALTER TABLE missing ADD COLUMN x INT").unwrap_err();
        assert!(err.message.contains("no such table"), "{}", err.message);
        assert!(err.sql.starts_with("ALTER TABLE missing"));
    }
}
