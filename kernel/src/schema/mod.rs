// Declarative Schema Builder
//
// Describes table alterations as data and renders them into
// dialect-specific DDL. Rendering is pure; nothing is executed here.

use serde::Serialize;

use crate::dialect::Dialect;

/// Column type, either portable or a dialect-native expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    UnsignedInteger,
    DateTime,

    /// Type expression copied verbatim from the catalog.
    Declared(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DefaultValue {
    None,
    Integer(i64),
    CurrentTimestamp,
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub default: DefaultValue,
    pub nullable: bool,
    pub auto_increment: bool,

    /// Position hint. Ignored by dialects that can only append.
    pub after: Option<String>,
}

impl ColumnDefinition {
    /// A `NOT NULL` column without default.
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            default: DefaultValue::None,
            nullable: false,
            auto_increment: false,
            after: None,
        }
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.auto_increment = enabled;
        self
    }

    pub fn after(mut self, column: &str) -> Self {
        self.after = Some(column.to_string());
        self
    }
}

/// A single declarative change to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaChange {
    DropPrimaryKey,
    ModifyColumn(ColumnDefinition),
    AddColumn(ColumnDefinition),
    AddPrimaryKey(Vec<String>),
    AddIndex { name: String, columns: Vec<String> },
}

impl SchemaChange {
    fn operation(&self) -> &'static str {
        match self {
            SchemaChange::DropPrimaryKey => "drop primary key",
            SchemaChange::ModifyColumn(_) => "modify column",
            SchemaChange::AddColumn(_) => "add column",
            SchemaChange::AddPrimaryKey(_) => "add primary key",
            SchemaChange::AddIndex { .. } => "add index",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{dialect} cannot {operation} on an existing table")]
    Unsupported {
        dialect: String,
        operation: &'static str,
    },
}

/// A batch of changes applied to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAlteration {
    table: String,
    changes: Vec<SchemaChange>,

    /// Columns identifying a row in emulation triggers. Empty means `rowid`.
    row_key: Vec<String>,
}

impl TableAlteration {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            changes: Vec::new(),
            row_key: Vec::new(),
        }
    }

    /// Identify rows by these columns instead of `rowid`.
    ///
    /// Required for SQLite `WITHOUT ROWID` tables.
    pub fn row_key<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.row_key = owned(columns);
        self
    }

    pub fn drop_primary_key(mut self) -> Self {
        self.changes.push(SchemaChange::DropPrimaryKey);
        self
    }

    pub fn modify_column(mut self, column: ColumnDefinition) -> Self {
        self.changes.push(SchemaChange::ModifyColumn(column));
        self
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.changes.push(SchemaChange::AddColumn(column));
        self
    }

    pub fn primary_key<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.changes.push(SchemaChange::AddPrimaryKey(owned(columns)));
        self
    }

    pub fn index<S: AsRef<str>>(mut self, name: &str, columns: &[S]) -> Self {
        self.changes.push(SchemaChange::AddIndex {
            name: name.to_string(),
            columns: owned(columns),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Render the batch as an ordered list of statements.
    pub fn render(&self, dialect: &Dialect) -> Result<Vec<String>, SchemaError> {
        if self.changes.is_empty() {
            return Ok(Vec::new());
        }
        match dialect {
            Dialect::MySql => Ok(vec![self.render_mysql()]),
            Dialect::Sqlite => self.render_sqlite(),
            Dialect::Unsupported(_) => Err(SchemaError::Unsupported {
                dialect: dialect.to_string(),
                operation: self.changes[0].operation(),
            }),
        }
    }

    // MySQL applies every clause of one ALTER together.
    fn render_mysql(&self) -> String {
        let d = Dialect::MySql;
        let clauses: Vec<String> = self
            .changes
            .iter()
            .map(|change| match change {
                SchemaChange::DropPrimaryKey => "DROP PRIMARY KEY".to_string(),
                SchemaChange::ModifyColumn(col) => {
                    format!("MODIFY COLUMN {}", column_sql(&d, col))
                }
                SchemaChange::AddColumn(col) => {
                    let mut clause = format!("ADD COLUMN {}", column_sql(&d, col));
                    if let Some(after) = &col.after {
                        clause.push_str(&format!(" AFTER {}", d.quote_ident(after)));
                    }
                    clause
                }
                SchemaChange::AddPrimaryKey(cols) => {
                    format!("ADD PRIMARY KEY ({})", d.quote_list(cols))
                }
                SchemaChange::AddIndex { name, columns } => format!(
                    "ADD INDEX {} ({})",
                    d.quote_ident(name),
                    d.quote_list(columns)
                ),
            })
            .collect();

        format!(
            "ALTER TABLE {} {}",
            d.quote_ident(&self.table),
            clauses.join(", ")
        )
    }

    fn render_sqlite(&self) -> Result<Vec<String>, SchemaError> {
        let d = Dialect::Sqlite;
        let table = d.quote_ident(&self.table);
        let mut statements = Vec::new();

        for change in &self.changes {
            match change {
                SchemaChange::AddColumn(col) if col.default == DefaultValue::CurrentTimestamp => {
                    // SQLite rejects non-constant defaults on ADD COLUMN.
                    // Stamp existing rows, then stamp new rows by trigger.
                    let column = d.quote_ident(&col.name);
                    let nullable = ColumnDefinition {
                        default: DefaultValue::None,
                        nullable: true,
                        ..col.clone()
                    };
                    statements.push(format!(
                        "ALTER TABLE {table} ADD COLUMN {}",
                        column_sql(&d, &nullable)
                    ));
                    statements.push(format!(
                        "UPDATE {table} SET {column} = CURRENT_TIMESTAMP WHERE {column} IS NULL"
                    ));
                    statements.push(format!(
                        "CREATE TRIGGER {} AFTER INSERT ON {table} FOR EACH ROW \
                         WHEN NEW.{column} IS NULL BEGIN \
                         UPDATE {table} SET {column} = CURRENT_TIMESTAMP \
                         WHERE {} AND {column} IS NULL; \
                         END",
                        d.quote_ident(&default_now_trigger(&self.table, &col.name)),
                        self.new_row_predicate(&d),
                    ));
                }
                SchemaChange::AddColumn(col) => {
                    statements.push(format!(
                        "ALTER TABLE {table} ADD COLUMN {}",
                        column_sql(&d, col)
                    ));
                }
                SchemaChange::AddIndex { name, columns } => {
                    statements.push(format!(
                        "CREATE INDEX {} ON {table} ({})",
                        d.quote_ident(name),
                        d.quote_list(columns)
                    ));
                }
                other => {
                    return Err(SchemaError::Unsupported {
                        dialect: d.to_string(),
                        operation: other.operation(),
                    })
                }
            }
        }

        Ok(statements)
    }

    // Matches the row just inserted, as seen from a trigger body.
    fn new_row_predicate(&self, d: &Dialect) -> String {
        if self.row_key.is_empty() {
            return "rowid = NEW.rowid".to_string();
        }
        self.row_key
            .iter()
            .map(|k| {
                let k = d.quote_ident(k);
                format!("{k} IS NEW.{k}")
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Name of the trigger emulating a `CURRENT_TIMESTAMP` default on SQLite.
pub fn default_now_trigger(table: &str, column: &str) -> String {
    format!("{table}_{column}_default_now")
}

fn owned<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    columns.iter().map(|c| c.as_ref().to_string()).collect()
}

fn column_sql(dialect: &Dialect, col: &ColumnDefinition) -> String {
    let name = dialect.quote_ident(&col.name);
    let mut sql = format!("{name} {}", type_sql(dialect, &col.column_type));

    sql.push_str(if col.nullable { " NULL" } else { " NOT NULL" });

    match &col.default {
        DefaultValue::None => {}
        DefaultValue::Integer(n) => sql.push_str(&format!(" DEFAULT {n}")),
        DefaultValue::CurrentTimestamp => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
        DefaultValue::Literal(s) => {
            sql.push_str(&format!(" DEFAULT {}", dialect.quote_literal(s)))
        }
    }

    if col.auto_increment {
        sql.push_str(" AUTO_INCREMENT");
    }

    // SQLite has no unsigned integers.
    if *dialect == Dialect::Sqlite && col.column_type == ColumnType::UnsignedInteger {
        sql.push_str(&format!(" CHECK ({name} >= 0)"));
    }

    sql
}

fn type_sql(dialect: &Dialect, column_type: &ColumnType) -> String {
    match (dialect, column_type) {
        (_, ColumnType::Declared(t)) => t.clone(),
        (Dialect::Sqlite, ColumnType::UnsignedInteger) => "INTEGER".into(),
        (_, ColumnType::UnsignedInteger) => "INT UNSIGNED".into(),
        (_, ColumnType::DateTime) => "DATETIME".into(),
    }
}
