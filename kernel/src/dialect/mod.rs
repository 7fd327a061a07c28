// SQL Dialect Selection
//
// Maps a connection's driver identifier onto the closed set of
// dialects the transformer knows how to handle.

use serde::Serialize;

/// SQL dialect of the active connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Dialect {
    /// MySQL: primary keys can be dropped and rebuilt in place.
    MySql,

    /// SQLite: primary keys are fixed at table creation.
    Sqlite,

    /// Any other driver. Carries the raw identifier for diagnostics.
    Unsupported(String),
}

impl Dialect {
    /// Detect the dialect from a driver identifier (case-insensitive).
    pub fn detect(driver: &str) -> Self {
        match driver.trim().to_ascii_lowercase().as_str() {
            "mysql" => Dialect::MySql,
            "sqlite" => Dialect::Sqlite,
            _ => Dialect::Unsupported(driver.to_string()),
        }
    }

    /// Driver name as reported by the connection.
    pub fn driver(&self) -> String {
        match self {
            Dialect::Unsupported(driver) => driver.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Dialect::Unsupported(_))
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Unsupported(_) => {
                format!("\"{}\"", ident.replace('"', "\"\""))
            }
        }
    }

    /// Quote a comma-separated identifier list.
    pub fn quote_list<S: AsRef<str>>(&self, idents: &[S]) -> String {
        idents
            .iter()
            .map(|i| self.quote_ident(i.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Quote a string literal.
    pub fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::MySql => f.write_str("mysql"),
            Dialect::Sqlite => f.write_str("sqlite"),
            Dialect::Unsupported(driver) => write!(f, "unsupported({driver})"),
        }
    }
}
