// Temporalize Kernel
//
// Schema surgery that turns a relational table into a temporal one:
// primary key discovery, dialect-specific DDL planning, step-wise
// application, and postcondition checks.

pub mod config;
pub mod dialect;
pub mod executor;
pub mod inspector;
pub mod invariants;
pub mod schema;
pub mod transform;

pub use config::TemporalConfig;
pub use dialect::Dialect;
pub use executor::{DdlExecutor, RecordingExecutor, SqliteExecutor};
pub use transform::{TemporalTransformError, TemporalTransformer, TransformOutcome};
