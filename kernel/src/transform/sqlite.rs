// SQLite strategy: validity columns and indexes only.
//
// SQLite cannot alter a primary key after creation, so no version
// column is added and the key is left as it is.

use crate::config::TemporalConfig;
use crate::dialect::Dialect;
use crate::inspector::{PrimaryKeySet, TableCatalog};
use crate::schema::{ColumnDefinition, ColumnType, DefaultValue, SchemaError, TableAlteration};

use super::{
    current_version_columns, index_names, version_at_time_columns, PlanStep, StepKind,
    TemporalStrategy,
};

pub struct SqliteStrategy;

impl TemporalStrategy for SqliteStrategy {
    fn added_columns<'c>(&self, config: &'c TemporalConfig) -> Vec<&'c str> {
        vec![config.start_column.as_str(), config.end_column.as_str()]
    }

    fn resulting_primary_key(&self, keys: &PrimaryKeySet, _config: &TemporalConfig) -> Vec<String> {
        keys.names()
    }

    fn plan_steps(
        &self,
        catalog: &TableCatalog,
        config: &TemporalConfig,
    ) -> Result<Vec<PlanStep>, SchemaError> {
        let dialect = Dialect::Sqlite;
        let table = catalog.table.as_str();
        let keys = &catalog.primary_keys;
        let (current_version, version_at_time) = index_names(&dialect, table, config);

        // Keyed on the primary key so WITHOUT ROWID tables work too.
        let add = TableAlteration::new(table)
            .row_key(&keys.names())
            .add_column(
                ColumnDefinition::new(&config.start_column, ColumnType::DateTime)
                    .default_value(DefaultValue::CurrentTimestamp),
            )
            .add_column(
                ColumnDefinition::new(&config.end_column, ColumnType::DateTime)
                    .default_value(DefaultValue::Literal(config.max_sentinel.clone())),
            )
            .index(&current_version, &current_version_columns(keys, config))
            .index(&version_at_time, &version_at_time_columns(keys, config));

        Ok(vec![PlanStep {
            kind: StepKind::AddTemporalColumns,
            statements: add.render(&dialect)?,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::PrimaryKeyColumn;

    #[test]
    fn single_step_with_prefixed_indexes() {
        let catalog = TableCatalog {
            table: "products".into(),
            columns: vec!["id".into()],
            primary_keys: [PrimaryKeyColumn {
                name: "id".into(),
                declared_type: "INTEGER".into(),
                auto_increment: false,
            }]
            .into_iter()
            .collect(),
        };

        let steps = SqliteStrategy
            .plan_steps(&catalog, &TemporalConfig::default())
            .unwrap();

        assert_eq!(steps.len(), 1);
        let statements = &steps[0].statements;
        assert!(statements.iter().all(|s| !s.contains("\"version\"")));
        assert!(statements[2].contains("WHERE \"id\" IS NEW.\"id\" AND \"temporal_start\" IS NULL"));
        assert_eq!(
            statements[statements.len() - 2],
            "CREATE INDEX \"products_current_version\" ON \"products\" (\"temporal_end\", \"id\")"
        );
        assert_eq!(
            statements[statements.len() - 1],
            "CREATE INDEX \"products_version_at_time\" ON \"products\" \
             (\"id\", \"temporal_start\", \"temporal_end\")"
        );
    }
}
