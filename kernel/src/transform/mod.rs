// Temporal Transformer
//
// Turns an ordinary table into a temporal one: adds version and
// validity columns, rebuilds the primary key where the dialect
// allows it, and creates the lookup indexes.
//
// Planning is pure. Applying is NOT atomic: steps run in order and
// the first failure halts the run, leaving earlier steps applied.

mod mysql;
mod sqlite;

pub use mysql::MySqlStrategy;
pub use sqlite::SqliteStrategy;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{ConfigError, TemporalConfig};
use crate::dialect::Dialect;
use crate::executor::{DdlExecutor, ExecutorError};
use crate::inspector::{inspect_table, IntrospectionError, PrimaryKeySet, TableCatalog};
use crate::schema::SchemaError;

/// One stage of a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Drop the key and strip auto-increment from key columns.
    DropPrimaryKey,

    /// Add temporal columns, the new key and the lookup indexes.
    AddTemporalColumns,

    /// Put auto-increment back on the original key columns.
    RestoreAutoIncrement,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StepKind::DropPrimaryKey => "drop-primary-key",
            StepKind::AddTemporalColumns => "add-temporal-columns",
            StepKind::RestoreAutoIncrement => "restore-auto-increment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub kind: StepKind,
    pub statements: Vec<String>,
}

/// Ordered statements for one table, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformPlan {
    /// Correlates the log lines of one run.
    pub run_id: Uuid,
    pub table: String,
    pub dialect: Dialect,
    pub primary_keys: PrimaryKeySet,
    pub resulting_primary_key: Vec<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned(TransformPlan),

    /// The driver is not one we can transform. Nothing was inspected.
    Skipped { table: String, driver: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransformOutcome {
    /// Primary key rebuilt as original keys + version.
    Rebuilt {
        table: String,
        primary_key: Vec<String>,
        restored_auto_increment: Vec<String>,
    },

    /// Temporal columns and indexes added; primary key untouched.
    ColumnsOnly { table: String, primary_key: Vec<String> },

    /// Unsupported driver: the schema was not modified.
    Skipped { table: String, driver: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TemporalTransformError {
    #[error("invalid temporal configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error("table `{table}` has no primary keys")]
    NoPrimaryKey { table: String },

    #[error("table `{table}` already has a column named `{column}`")]
    ColumnCollision { table: String, column: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(
        "step `{step}` failed on table `{table}` after {} completed step(s): {source}",
        .completed.len()
    )]
    Step {
        table: String,
        step: StepKind,
        completed: Vec<StepKind>,
        #[source]
        source: ExecutorError,
    },
}

/// Dialect-specific planning.
pub trait TemporalStrategy {
    /// Columns this strategy adds to the table.
    fn added_columns<'c>(&self, config: &'c TemporalConfig) -> Vec<&'c str>;

    /// Primary key after the transformation.
    fn resulting_primary_key(&self, keys: &PrimaryKeySet, config: &TemporalConfig) -> Vec<String>;

    /// Ordered steps for a table with a non-empty primary key.
    fn plan_steps(
        &self,
        catalog: &TableCatalog,
        config: &TemporalConfig,
    ) -> Result<Vec<PlanStep>, SchemaError>;
}

fn strategy_for(dialect: &Dialect) -> Option<Box<dyn TemporalStrategy>> {
    match dialect {
        Dialect::MySql => Some(Box::new(MySqlStrategy)),
        Dialect::Sqlite => Some(Box::new(SqliteStrategy)),
        Dialect::Unsupported(_) => None,
    }
}

/// Columns of the "current version" index: end column, then keys.
pub fn current_version_columns(keys: &PrimaryKeySet, config: &TemporalConfig) -> Vec<String> {
    let mut columns = vec![config.end_column.clone()];
    columns.extend(keys.names());
    columns
}

/// Columns of the "version at time" index: keys, then start and end.
pub fn version_at_time_columns(keys: &PrimaryKeySet, config: &TemporalConfig) -> Vec<String> {
    let mut columns = keys.names();
    columns.push(config.start_column.clone());
    columns.push(config.end_column.clone());
    columns
}

/// Index names as created for `dialect`.
///
/// SQLite index names are database-wide, so they carry the table name.
pub fn index_names(dialect: &Dialect, table: &str, config: &TemporalConfig) -> (String, String) {
    match dialect {
        Dialect::Sqlite => (
            format!("{table}_{}", config.current_version_index),
            format!("{table}_{}", config.version_at_time_index),
        ),
        _ => (
            config.current_version_index.clone(),
            config.version_at_time_index.clone(),
        ),
    }
}

pub struct TemporalTransformer<'a, E: DdlExecutor + ?Sized> {
    executor: &'a mut E,
    config: TemporalConfig,
}

impl<'a, E: DdlExecutor + ?Sized> TemporalTransformer<'a, E> {
    pub fn new(executor: &'a mut E, config: TemporalConfig) -> Self {
        Self { executor, config }
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::detect(self.executor.driver_name())
    }

    /// Inspect the table and build the plan without touching the schema.
    pub fn plan(&mut self, table: &str) -> Result<PlanOutcome, TemporalTransformError> {
        self.config.validate()?;

        let dialect = self.dialect();
        let Some(strategy) = strategy_for(&dialect) else {
            tracing::warn!(
                table,
                driver = self.executor.driver_name(),
                "unsupported driver, leaving table unchanged"
            );
            return Ok(PlanOutcome::Skipped {
                table: table.to_string(),
                driver: self.executor.driver_name().to_string(),
            });
        };

        let catalog = inspect_table(&mut *self.executor, &dialect, table)?;

        if catalog.primary_keys.is_empty() {
            return Err(TemporalTransformError::NoPrimaryKey {
                table: table.to_string(),
            });
        }

        for column in strategy.added_columns(&self.config) {
            if catalog.has_column(column) {
                return Err(TemporalTransformError::ColumnCollision {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }

        let steps = strategy.plan_steps(&catalog, &self.config)?;
        let resulting_primary_key =
            strategy.resulting_primary_key(&catalog.primary_keys, &self.config);

        Ok(PlanOutcome::Planned(TransformPlan {
            run_id: Uuid::new_v4(),
            table: table.to_string(),
            dialect,
            primary_keys: catalog.primary_keys,
            resulting_primary_key,
            steps,
        }))
    }

    /// Execute a plan step by step, halting on the first failure.
    pub fn apply(&mut self, plan: &TransformPlan) -> Result<TransformOutcome, TemporalTransformError> {
        let mut completed = Vec::with_capacity(plan.steps.len());

        for step in &plan.steps {
            tracing::info!(
                run_id = %plan.run_id,
                table = %plan.table,
                step = %step.kind,
                statements = step.statements.len(),
                "applying step"
            );

            for sql in &step.statements {
                tracing::debug!(run_id = %plan.run_id, %sql, "executing");

                if let Err(source) = self.executor.execute(sql) {
                    tracing::error!(
                        run_id = %plan.run_id,
                        table = %plan.table,
                        step = %step.kind,
                        completed = ?completed,
                        error = %source,
                        "step failed, table left partially transformed"
                    );
                    return Err(TemporalTransformError::Step {
                        table: plan.table.clone(),
                        step: step.kind,
                        completed,
                        source,
                    });
                }
            }

            completed.push(step.kind);
        }

        tracing::info!(run_id = %plan.run_id, table = %plan.table, "table is temporal");

        Ok(match plan.dialect {
            Dialect::MySql => TransformOutcome::Rebuilt {
                table: plan.table.clone(),
                primary_key: plan.resulting_primary_key.clone(),
                restored_auto_increment: plan
                    .primary_keys
                    .auto_increment_columns()
                    .map(|c| c.name.clone())
                    .collect(),
            },
            _ => TransformOutcome::ColumnsOnly {
                table: plan.table.clone(),
                primary_key: plan.resulting_primary_key.clone(),
            },
        })
    }

    /// Plan and apply in one call.
    pub fn make_temporal(&mut self, table: &str) -> Result<TransformOutcome, TemporalTransformError> {
        match self.plan(table)? {
            PlanOutcome::Planned(plan) => self.apply(&plan),
            PlanOutcome::Skipped { table, driver } => Ok(TransformOutcome::Skipped { table, driver }),
        }
    }
}
