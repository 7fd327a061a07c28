// Temporal Column Configuration
//
// Names of the columns and indexes added to a temporal table,
// plus the sentinel end date meaning "still current".

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Configuration loaded from JSON. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub version_column: String,
    pub start_column: String,
    pub end_column: String,

    /// Date literal used as the open end of the current version.
    pub max_sentinel: String,

    pub current_version_index: String,
    pub version_at_time_index: String,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            version_column: "version".into(),
            start_column: "temporal_start".into(),
            end_column: "temporal_end".into(),
            max_sentinel: "2999-01-01".into(),
            current_version_index: "current_version".into(),
            version_at_time_index: "version_at_time".into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{field}` must not be empty")]
    EmptyName { field: &'static str },

    #[error("column name `{0}` is used more than once")]
    DuplicateColumn(String),

    #[error("index name `{0}` is used more than once")]
    DuplicateIndex(String),

    #[error("max sentinel `{0}` is not a valid date literal")]
    InvalidSentinel(String),
}

impl TemporalConfig {
    /// The three temporal column names in declaration order.
    pub fn columns(&self) -> [&str; 3] {
        [
            self.version_column.as_str(),
            self.start_column.as_str(),
            self.end_column.as_str(),
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("version_column", &self.version_column),
            ("start_column", &self.start_column),
            ("end_column", &self.end_column),
            ("current_version_index", &self.current_version_index),
            ("version_at_time_index", &self.version_at_time_index),
        ];
        for (field, value) in named {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyName { field });
            }
        }

        let columns = self.columns();
        for (i, name) in columns.iter().enumerate() {
            if columns[i + 1..].iter().any(|o| o.eq_ignore_ascii_case(name)) {
                return Err(ConfigError::DuplicateColumn(name.to_string()));
            }
        }

        if self
            .current_version_index
            .eq_ignore_ascii_case(&self.version_at_time_index)
        {
            return Err(ConfigError::DuplicateIndex(self.current_version_index.clone()));
        }

        if !is_date_literal(&self.max_sentinel) {
            return Err(ConfigError::InvalidSentinel(self.max_sentinel.clone()));
        }

        Ok(())
    }
}

fn is_date_literal(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TemporalConfig::default();
        assert_eq!(config.columns(), ["version", "temporal_start", "temporal_end"]);
        assert_eq!(config.max_sentinel, "2999-01-01");
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: TemporalConfig =
            serde_json::from_str(r#"{ "version_column": "rev" }"#).unwrap();

        assert_eq!(config.version_column, "rev");
        assert_eq!(config.end_column, "temporal_end");
    }

    #[test]
    fn rejects_bad_names_and_sentinels() {
        let mut config = TemporalConfig::default();
        config.end_column = "Temporal_Start".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateColumn("temporal_start".into()))
        );

        let mut config = TemporalConfig::default();
        config.version_column = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyName { .. })));

        let mut config = TemporalConfig::default();
        config.max_sentinel = "2999-13-01".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSentinel(_))));

        let mut config = TemporalConfig::default();
        config.max_sentinel = "2999-01-01 00:00:00".into();
        config.validate().unwrap();
    }
}
