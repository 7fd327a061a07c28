// In-memory executor: serves canned catalog rows and records
// every statement instead of running it.

use super::{CatalogRow, DdlExecutor, ExecutorError};

#[derive(Debug, Default)]
pub struct RecordingExecutor {
    driver: String,
    catalog: Vec<(String, Vec<CatalogRow>)>,
    fail_on: Option<(String, String)>,
    fail_query_on: Option<(String, String)>,
    executed: Vec<String>,
    queries: Vec<String>,
}

impl RecordingExecutor {
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            ..Self::default()
        }
    }

    /// Answer any catalog query containing `fragment` with `rows`.
    ///
    /// Earlier registrations win.
    pub fn with_catalog(mut self, fragment: &str, rows: Vec<CatalogRow>) -> Self {
        self.catalog.push((fragment.to_string(), rows));
        self
    }

    /// Fail any executed statement containing `fragment` with `message`.
    pub fn fail_on(mut self, fragment: &str, message: &str) -> Self {
        self.fail_on = Some((fragment.to_string(), message.to_string()));
        self
    }

    /// Fail any catalog query containing `fragment` with `message`.
    pub fn fail_query_on(mut self, fragment: &str, message: &str) -> Self {
        self.fail_query_on = Some((fragment.to_string(), message.to_string()));
        self
    }

    /// Statements that executed successfully, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Catalog queries received, in order.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }
}

impl DdlExecutor for RecordingExecutor {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    fn execute(&mut self, sql: &str) -> Result<(), ExecutorError> {
        if let Some((fragment, message)) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(ExecutorError::new(sql, message.clone()));
            }
        }
        self.executed.push(sql.to_string());
        Ok(())
    }

    fn query(&mut self, sql: &str) -> Result<Vec<CatalogRow>, ExecutorError> {
        self.queries.push(sql.to_string());
        if let Some((fragment, message)) = &self.fail_query_on {
            if sql.contains(fragment.as_str()) {
                return Err(ExecutorError::new(sql, message.clone()));
            }
        }
        Ok(self
            .catalog
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_statements_and_injects_failures() {
        let mut exec = RecordingExecutor::new("mysql")
            .with_catalog("SHOW COLUMNS", vec![CatalogRow::new().with("Field", "id")])
            .fail_on("DROP", "boom");

        exec.execute("CREATE TABLE t (id INT)").unwrap();
        let err = exec.execute("DROP TABLE t").unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(exec.executed(), ["CREATE TABLE t (id INT)"]);

        assert_eq!(exec.query("SHOW COLUMNS FROM `t`").unwrap().len(), 1);
        assert!(exec.query("SHOW INDEX FROM `t`").unwrap().is_empty());
        assert_eq!(exec.queries().len(), 2);
    }

    #[test]
    fn injected_query_failure_is_recorded() {
        let mut exec = RecordingExecutor::new("mysql")
            .with_catalog("SHOW", vec![CatalogRow::new().with("Field", "id")])
            .fail_query_on("SHOW INDEX", "Lost connection to MySQL server");

        assert!(exec.query("SHOW COLUMNS FROM `t`").is_ok());
        let err = exec.query("SHOW INDEX FROM `t`").unwrap_err();
        assert_eq!(err.message, "Lost connection to MySQL server");
        assert_eq!(err.sql, "SHOW INDEX FROM `t`");
        assert_eq!(exec.queries().len(), 2);
    }
}
