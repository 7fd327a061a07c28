// Schema Invariant Framework
//
// Invariants are pure rules that must hold on a table's schema
// once it has been made temporal. They run against a fresh catalog
// snapshot taken after the transformation, never against the plan.
//
// Each dialect has its own postcondition set: the MySQL set asserts
// the rebuilt key, the SQLite set asserts the key was left alone.

use serde::Serialize;

use crate::config::TemporalConfig;
use crate::dialect::Dialect;
use crate::executor::{CatalogRow, DdlExecutor, ExecutorError};
use crate::inspector::{load_column_rows, IntrospectionError, PrimaryKeySet};
use crate::schema::default_now_trigger;
use crate::transform::{current_version_columns, index_names, version_at_time_columns};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub auto_increment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// Catalog view of a table: columns, key, secondary indexes, triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
    pub triggers: Vec<String>,
}

impl SchemaSnapshot {
    pub fn load<E: DdlExecutor + ?Sized>(
        executor: &mut E,
        dialect: &Dialect,
        table: &str,
    ) -> Result<Self, IntrospectionError> {
        let rows = load_column_rows(executor, dialect, table)?;
        let catalog_err = |source: ExecutorError| IntrospectionError::Catalog {
            table: table.to_string(),
            source,
        };

        match dialect {
            Dialect::MySql => {
                let columns = rows
                    .iter()
                    .filter_map(|r| {
                        Some(ColumnInfo {
                            name: r.text("field")?,
                            column_type: r.text("type").unwrap_or_default(),
                            nullable: r.text("null").is_some_and(|n| n.eq_ignore_ascii_case("yes")),
                            default: r.text("default"),
                            auto_increment: r
                                .text("extra")
                                .is_some_and(|e| e.to_ascii_lowercase().contains("auto_increment")),
                        })
                    })
                    .collect();

                let sql = format!("SHOW INDEX FROM {}", dialect.quote_ident(table));
                let index_rows: Vec<CatalogRow> = executor
                    .query(&sql)
                    .map_err(catalog_err)?
                    .iter()
                    .map(CatalogRow::normalized)
                    .collect();

                let mut indexes =
                    group_index_rows(&index_rows, "key_name", "seq_in_index", "column_name");
                let primary = indexes.iter().position(|i| i.name == "PRIMARY");
                let primary_key = match primary {
                    Some(pos) => indexes.remove(pos).columns,
                    None => Vec::new(),
                };

                Ok(Self {
                    table: table.to_string(),
                    columns,
                    primary_key,
                    indexes,
                    triggers: Vec::new(),
                })
            }
            Dialect::Sqlite => {
                let columns = rows
                    .iter()
                    .filter_map(|r| {
                        Some(ColumnInfo {
                            name: r.text("name")?,
                            column_type: r.text("type").unwrap_or_default(),
                            nullable: !r.is_truthy("notnull"),
                            default: r.text("dflt_value"),
                            auto_increment: false,
                        })
                    })
                    .collect();

                // Catalog order, matching what the inspector reports.
                let primary_key = rows
                    .iter()
                    .filter(|r| r.is_truthy("pk"))
                    .filter_map(|r| r.text("name"))
                    .collect();

                let list_sql = format!("PRAGMA index_list({})", dialect.quote_ident(table));
                let mut indexes = Vec::new();
                for row in executor.query(&list_sql).map_err(catalog_err)? {
                    let Some(name) = row.text("name") else { continue };
                    let info_sql = format!("PRAGMA index_info({})", dialect.quote_ident(&name));
                    let info = executor.query(&info_sql).map_err(catalog_err)?;
                    let mut cols: Vec<(i64, String)> = info
                        .iter()
                        .filter_map(|r| Some((r.integer("seqno")?, r.text("name")?)))
                        .collect();
                    cols.sort_by_key(|(seq, _)| *seq);
                    indexes.push(IndexInfo {
                        name,
                        columns: cols.into_iter().map(|(_, c)| c).collect(),
                    });
                }

                let trigger_sql = format!(
                    "SELECT name FROM sqlite_master WHERE type = 'trigger' AND tbl_name = {}",
                    dialect.quote_literal(table)
                );
                let triggers = executor
                    .query(&trigger_sql)
                    .map_err(catalog_err)?
                    .iter()
                    .filter_map(|r| r.text("name"))
                    .collect();

                Ok(Self {
                    table: table.to_string(),
                    columns,
                    primary_key,
                    indexes,
                    triggers,
                })
            }
            Dialect::Unsupported(_) => Err(IntrospectionError::UnsupportedDialect {
                table: table.to_string(),
                driver: dialect.driver(),
            }),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

fn group_index_rows(rows: &[CatalogRow], name: &str, seq: &str, column: &str) -> Vec<IndexInfo> {
    let mut grouped: Vec<(String, Vec<(i64, String)>)> = Vec::new();
    for row in rows {
        let (Some(index), Some(col)) = (row.text(name), row.text(column)) else {
            continue;
        };
        let position = row.integer(seq).unwrap_or(0);
        match grouped.iter_mut().find(|(n, _)| *n == index) {
            Some((_, cols)) => cols.push((position, col)),
            None => grouped.push((index, vec![(position, col)])),
        }
    }

    grouped
        .into_iter()
        .map(|(name, mut cols)| {
            cols.sort_by_key(|(pos, _)| *pos);
            IndexInfo {
                name,
                columns: cols.into_iter().map(|(_, c)| c).collect(),
            }
        })
        .collect()
}

/// Everything an invariant may look at.
pub struct Postcondition<'a> {
    pub dialect: &'a Dialect,
    pub config: &'a TemporalConfig,

    /// Primary key as discovered before the transformation.
    pub before: &'a PrimaryKeySet,

    pub after: &'a SchemaSnapshot,
}

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult;
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    /// Create a new invariant engine.
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Postconditions of a successful transformation on `dialect`.
    pub fn for_dialect(dialect: &Dialect) -> Self {
        let mut engine = Self::new();
        match dialect {
            Dialect::MySql => {
                engine.register(PrimaryKeyExtended);
                engine.register(VersionColumnShape);
                engine.register(ValidityColumns);
                engine.register(AutoIncrementPreserved);
                engine.register(TemporalIndexes);
            }
            Dialect::Sqlite => {
                engine.register(PrimaryKeyUnchanged);
                engine.register(ValidityColumns);
                engine.register(TemporalIndexes);
            }
            Dialect::Unsupported(_) => {}
        }
        engine
    }

    /// Register an invariant.
    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(&self, ctx: &Postcondition<'_>) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(ctx) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error(transparent)]
    Violation(#[from] InvariantViolation),
}

/// Snapshot the table and check the dialect's postconditions.
pub fn verify_postconditions<E: DdlExecutor + ?Sized>(
    executor: &mut E,
    dialect: &Dialect,
    table: &str,
    before: &PrimaryKeySet,
    config: &TemporalConfig,
) -> Result<SchemaSnapshot, VerifyError> {
    let after = SchemaSnapshot::load(executor, dialect, table)?;
    let ctx = Postcondition {
        dialect,
        config,
        before,
        after: &after,
    };
    InvariantEngine::for_dialect(dialect).evaluate(&ctx)?;
    tracing::debug!(table, %dialect, "postconditions hold");
    Ok(after)
}

fn unquoted(default: &str) -> &str {
    default.trim().trim_matches('\'')
}

pub struct PrimaryKeyExtended;

impl Invariant for PrimaryKeyExtended {
    fn name(&self) -> &'static str {
        "primary-key-extended-by-version"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        let mut expected = ctx.before.names();
        expected.push(ctx.config.version_column.clone());
        if ctx.after.primary_key == expected {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "expected key {:?}, found {:?}",
                expected, ctx.after.primary_key
            ))
        }
    }
}

pub struct PrimaryKeyUnchanged;

impl Invariant for PrimaryKeyUnchanged {
    fn name(&self) -> &'static str {
        "primary-key-unchanged"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        let expected = ctx.before.names();
        if ctx.after.primary_key == expected {
            InvariantResult::Pass
        } else {
            InvariantResult::Fail(format!(
                "expected key {:?}, found {:?}",
                expected, ctx.after.primary_key
            ))
        }
    }
}

pub struct VersionColumnShape;

impl Invariant for VersionColumnShape {
    fn name(&self) -> &'static str {
        "version-column-shape"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        let name = &ctx.config.version_column;
        let Some(col) = ctx.after.column(name) else {
            return InvariantResult::Fail(format!("column `{name}` is missing"));
        };

        let ty = col.column_type.to_ascii_lowercase();
        if !ty.contains("int") || !ty.contains("unsigned") {
            return InvariantResult::Fail(format!("`{name}` has type `{}`", col.column_type));
        }
        if col.default.as_deref().map(unquoted) != Some("0") {
            return InvariantResult::Fail(format!("`{name}` does not default to 0"));
        }
        if col.auto_increment {
            return InvariantResult::Fail(format!("`{name}` must not auto-increment"));
        }
        InvariantResult::Pass
    }
}

pub struct ValidityColumns;

impl Invariant for ValidityColumns {
    fn name(&self) -> &'static str {
        "validity-columns"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        let config = ctx.config;
        let Some(start) = ctx.after.column(&config.start_column) else {
            return InvariantResult::Fail(format!("column `{}` is missing", config.start_column));
        };
        let Some(end) = ctx.after.column(&config.end_column) else {
            return InvariantResult::Fail(format!("column `{}` is missing", config.end_column));
        };

        let start_is_now = match ctx.dialect {
            Dialect::Sqlite => ctx
                .after
                .triggers
                .contains(&default_now_trigger(&ctx.after.table, &start.name)),
            _ => start
                .default
                .as_deref()
                .is_some_and(|d| d.to_ascii_lowercase().contains("current_timestamp")),
        };
        if !start_is_now {
            return InvariantResult::Fail(format!("`{}` does not default to now", start.name));
        }

        let end_is_sentinel = end
            .default
            .as_deref()
            .is_some_and(|d| unquoted(d).starts_with(&config.max_sentinel));
        if !end_is_sentinel {
            return InvariantResult::Fail(format!(
                "`{}` does not default to {}",
                end.name, config.max_sentinel
            ));
        }
        InvariantResult::Pass
    }
}

pub struct AutoIncrementPreserved;

impl Invariant for AutoIncrementPreserved {
    fn name(&self) -> &'static str {
        "auto-increment-preserved"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        for key in ctx.before.auto_increment_columns() {
            let Some(col) = ctx.after.column(&key.name) else {
                return InvariantResult::Fail(format!("column `{}` is missing", key.name));
            };
            if !col.auto_increment {
                return InvariantResult::Fail(format!("`{}` lost auto-increment", key.name));
            }
            if !col.column_type.eq_ignore_ascii_case(&key.declared_type) {
                return InvariantResult::Fail(format!(
                    "`{}` changed type from `{}` to `{}`",
                    key.name, key.declared_type, col.column_type
                ));
            }
        }
        InvariantResult::Pass
    }
}

pub struct TemporalIndexes;

impl Invariant for TemporalIndexes {
    fn name(&self) -> &'static str {
        "temporal-indexes"
    }

    fn validate(&self, ctx: &Postcondition<'_>) -> InvariantResult {
        let (current, at_time) = index_names(ctx.dialect, &ctx.after.table, ctx.config);
        let expected = [
            (current, current_version_columns(ctx.before, ctx.config)),
            (at_time, version_at_time_columns(ctx.before, ctx.config)),
        ];

        for (name, columns) in expected {
            match ctx.after.index(&name) {
                Some(index) if index.columns == columns => {}
                Some(index) => {
                    return InvariantResult::Fail(format!(
                        "index `{name}` covers {:?}, expected {:?}",
                        index.columns, columns
                    ))
                }
                None => return InvariantResult::Fail(format!("index `{name}` is missing")),
            }
        }
        InvariantResult::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RecordingExecutor, SqliteExecutor};
    use crate::inspector::discover_primary_keys;
    use crate::transform::TemporalTransformer;
    use serde_json::Value;

    fn describe(field: &str, ty: &str, key: &str, default: Value, extra: &str) -> CatalogRow {
        CatalogRow::new()
            .with("Field", field)
            .with("Type", ty)
            .with("Null", "NO")
            .with("Key", key)
            .with("Default", default)
            .with("Extra", extra)
    }

    fn index(key: &str, seq: i64, column: &str) -> CatalogRow {
        CatalogRow::new()
            .with("Table", "products")
            .with("Non_unique", if key == "PRIMARY" { 0 } else { 1 })
            .with("Key_name", key)
            .with("Seq_in_index", seq)
            .with("Column_name", column)
    }

    fn mysql_after(id_extra: &str) -> RecordingExecutor {
        RecordingExecutor::new("mysql")
            .with_catalog(
                "SHOW COLUMNS",
                vec![
                    describe("id", "int(10) unsigned", "PRI", Value::Null, id_extra),
                    describe("version", "int(10) unsigned", "PRI", "0".into(), ""),
                    describe("temporal_start", "datetime", "", "CURRENT_TIMESTAMP".into(), ""),
                    describe("temporal_end", "datetime", "MUL", "2999-01-01 00:00:00".into(), ""),
                    describe("name", "varchar(255)", "", Value::Null, ""),
                ],
            )
            .with_catalog(
                "SHOW INDEX",
                vec![
                    index("PRIMARY", 1, "id"),
                    index("PRIMARY", 2, "version"),
                    index("current_version", 1, "temporal_end"),
                    index("current_version", 2, "id"),
                    index("version_at_time", 3, "temporal_end"),
                    index("version_at_time", 1, "id"),
                    index("version_at_time", 2, "temporal_start"),
                ],
            )
    }

    fn products_before() -> PrimaryKeySet {
        [crate::inspector::PrimaryKeyColumn {
            name: "id".into(),
            declared_type: "int(10) unsigned".into(),
            auto_increment: true,
        }]
        .into_iter()
        .collect()
    }

    #[test]
    fn mysql_snapshot_orders_index_columns_by_sequence() {
        let mut exec = mysql_after("auto_increment");
        let snapshot = SchemaSnapshot::load(&mut exec, &Dialect::MySql, "products").unwrap();

        assert_eq!(snapshot.primary_key, ["id", "version"]);
        assert_eq!(
            snapshot.index("version_at_time").unwrap().columns,
            ["id", "temporal_start", "temporal_end"]
        );
        assert!(snapshot.column("id").unwrap().auto_increment);
    }

    #[test]
    fn mysql_postconditions_hold_on_rebuilt_table() {
        let mut exec = mysql_after("auto_increment");
        verify_postconditions(
            &mut exec,
            &Dialect::MySql,
            "products",
            &products_before(),
            &TemporalConfig::default(),
        )
        .unwrap();
    }

    #[test]
    fn lost_auto_increment_is_reported() {
        let mut exec = mysql_after("");
        let err = verify_postconditions(
            &mut exec,
            &Dialect::MySql,
            "products",
            &products_before(),
            &TemporalConfig::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("auto-increment-preserved"), "{err}");
    }

    #[test]
    fn engine_stops_at_first_failure() {
        struct AlwaysFails;

        impl Invariant for AlwaysFails {
            fn name(&self) -> &'static str {
                "always-fails"
            }

            fn validate(&self, _ctx: &Postcondition<'_>) -> InvariantResult {
                InvariantResult::Fail("nope".into())
            }
        }

        let mut engine = InvariantEngine::new();
        engine.register(AlwaysFails);
        engine.register(PrimaryKeyUnchanged);

        let before = PrimaryKeySet::new();
        let after = SchemaSnapshot {
            table: "t".into(),
            columns: vec![],
            primary_key: vec![],
            indexes: vec![],
            triggers: vec![],
        };
        let config = TemporalConfig::default();
        let ctx = Postcondition {
            dialect: &Dialect::Sqlite,
            config: &config,
            before: &before,
            after: &after,
        };

        let err = engine.evaluate(&ctx).unwrap_err();
        assert_eq!(err.invariant, "always-fails");
        assert!(InvariantEngine::for_dialect(&Dialect::Unsupported("x".into())).is_empty());
    }

    #[test]
    fn sqlite_composite_key_passes_after_transformation() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        exec.execute(
            "CREATE TABLE stock (sku TEXT NOT NULL, region TEXT NOT NULL, qty INTEGER, \
             PRIMARY KEY (region, sku))",
        )
        .unwrap();

        let before = discover_primary_keys(&mut exec, &Dialect::Sqlite, "stock").unwrap();
        TemporalTransformer::new(&mut exec, TemporalConfig::default())
            .make_temporal("stock")
            .unwrap();

        let snapshot = verify_postconditions(
            &mut exec,
            &Dialect::Sqlite,
            "stock",
            &before,
            &TemporalConfig::default(),
        )
        .unwrap();

        assert_eq!(snapshot.primary_key, ["sku", "region"]);
        assert_eq!(
            snapshot.index("stock_current_version").unwrap().columns,
            ["temporal_end", "sku", "region"]
        );
        assert!(snapshot.column("version").is_none());
    }
}
