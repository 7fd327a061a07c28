// MySQL strategy: full primary key rebuild.
//
// MySQL forbids an auto-increment column that is not part of a key,
// even transiently. Auto-increment is therefore stripped in the same
// statement that drops the key, and restored only once the new key
// covers the column again.

use crate::config::TemporalConfig;
use crate::dialect::Dialect;
use crate::inspector::{PrimaryKeySet, TableCatalog};
use crate::schema::{ColumnDefinition, ColumnType, DefaultValue, SchemaError, TableAlteration};

use super::{
    current_version_columns, index_names, version_at_time_columns, PlanStep, StepKind,
    TemporalStrategy,
};

pub struct MySqlStrategy;

impl TemporalStrategy for MySqlStrategy {
    fn added_columns<'c>(&self, config: &'c TemporalConfig) -> Vec<&'c str> {
        config.columns().to_vec()
    }

    fn resulting_primary_key(&self, keys: &PrimaryKeySet, config: &TemporalConfig) -> Vec<String> {
        let mut columns = keys.names();
        columns.push(config.version_column.clone());
        columns
    }

    fn plan_steps(
        &self,
        catalog: &TableCatalog,
        config: &TemporalConfig,
    ) -> Result<Vec<PlanStep>, SchemaError> {
        let dialect = Dialect::MySql;
        let table = catalog.table.as_str();
        let keys = &catalog.primary_keys;
        let mut steps = Vec::with_capacity(3);

        let mut drop = TableAlteration::new(table).drop_primary_key();
        for column in keys.auto_increment_columns() {
            drop = drop.modify_column(redeclare(&column.name, &column.declared_type, false));
        }
        steps.push(PlanStep {
            kind: StepKind::DropPrimaryKey,
            statements: drop.render(&dialect)?,
        });

        let last_key = keys.last().map(|c| c.name.as_str()).unwrap_or_default();
        let (current_version, version_at_time) = index_names(&dialect, table, config);

        let add = TableAlteration::new(table)
            .add_column(
                ColumnDefinition::new(&config.version_column, ColumnType::UnsignedInteger)
                    .default_value(DefaultValue::Integer(0))
                    .after(last_key),
            )
            .add_column(
                ColumnDefinition::new(&config.start_column, ColumnType::DateTime)
                    .default_value(DefaultValue::CurrentTimestamp)
                    .after(&config.version_column),
            )
            .add_column(
                ColumnDefinition::new(&config.end_column, ColumnType::DateTime)
                    .default_value(DefaultValue::Literal(config.max_sentinel.clone()))
                    .after(&config.start_column),
            )
            .primary_key(&self.resulting_primary_key(keys, config))
            .index(&current_version, &current_version_columns(keys, config))
            .index(&version_at_time, &version_at_time_columns(keys, config));
        steps.push(PlanStep {
            kind: StepKind::AddTemporalColumns,
            statements: add.render(&dialect)?,
        });

        let mut restore = TableAlteration::new(table);
        for column in keys.auto_increment_columns() {
            restore = restore.modify_column(redeclare(&column.name, &column.declared_type, true));
        }
        if !restore.is_empty() {
            steps.push(PlanStep {
                kind: StepKind::RestoreAutoIncrement,
                statements: restore.render(&dialect)?,
            });
        }

        Ok(steps)
    }
}

fn redeclare(name: &str, declared_type: &str, auto_increment: bool) -> ColumnDefinition {
    ColumnDefinition::new(name, ColumnType::Declared(declared_type.to_string()))
        .auto_increment(auto_increment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::PrimaryKeyColumn;

    fn key(name: &str, ty: &str, auto_increment: bool) -> PrimaryKeyColumn {
        PrimaryKeyColumn {
            name: name.into(),
            declared_type: ty.into(),
            auto_increment,
        }
    }

    #[test]
    fn auto_increment_is_stripped_then_restored_with_original_type() {
        let catalog = TableCatalog {
            table: "orders".into(),
            columns: vec!["shop".into(), "id".into()],
            primary_keys: [key("shop", "varchar(16)", false), key("id", "bigint(20)", true)]
                .into_iter()
                .collect(),
        };

        let steps = MySqlStrategy
            .plan_steps(&catalog, &TemporalConfig::default())
            .unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].statements,
            ["ALTER TABLE `orders` DROP PRIMARY KEY, MODIFY COLUMN `id` bigint(20) NOT NULL"]
        );
        assert!(steps[1].statements[0].contains("AFTER `id`"));
        assert!(steps[1].statements[0]
            .contains("ADD INDEX `version_at_time` (`shop`, `id`, `temporal_start`, `temporal_end`)"));
        assert_eq!(
            steps[2].statements,
            ["ALTER TABLE `orders` MODIFY COLUMN `id` bigint(20) NOT NULL AUTO_INCREMENT"]
        );
    }

    #[test]
    fn adds_all_three_columns() {
        let config = TemporalConfig::default();
        assert_eq!(
            MySqlStrategy.added_columns(&config),
            ["version", "temporal_start", "temporal_end"]
        );
    }
}
