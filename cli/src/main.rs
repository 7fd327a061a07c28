use std::fs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use temporalize_kernel::executor::CatalogRow;
use temporalize_kernel::inspector::discover_primary_keys;
use temporalize_kernel::invariants::{verify_postconditions, SchemaSnapshot};
use temporalize_kernel::transform::{PlanOutcome, TransformOutcome};
use temporalize_kernel::{
    DdlExecutor, Dialect, RecordingExecutor, SqliteExecutor, TemporalConfig, TemporalTransformer,
};

/// Temporal table converter
#[derive(Parser, Debug)]
#[command(name = "temporalize")]
#[command(about = "Convert a table into a versioned temporal table", long_about = None)]
struct Cli {
    /// Path to temporal config JSON
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    version_column: Option<String>,

    #[arg(long, global = true)]
    start_column: Option<String>,

    #[arg(long, global = true)]
    end_column: Option<String>,

    /// Date literal marking the current version
    #[arg(long, global = true)]
    max_sentinel: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the primary key of a SQLite table
    Inspect {
        #[arg(long)]
        sqlite: String,

        #[arg(long)]
        table: String,
    },

    /// Print the statements a transformation would run
    Plan {
        #[arg(long)]
        table: String,

        /// SQLite database file to inspect
        #[arg(long, conflicts_with_all = ["driver", "catalog"])]
        sqlite: Option<String>,

        /// Driver name for an offline catalog dump
        #[arg(long, requires = "catalog")]
        driver: Option<String>,

        /// Path to a JSON array of column catalog rows
        #[arg(long, requires = "driver")]
        catalog: Option<String>,
    },

    /// Transform a SQLite table in place
    Apply {
        #[arg(long)]
        sqlite: String,

        #[arg(long)]
        table: String,

        /// Skip the postcondition check
        #[arg(long)]
        no_verify: bool,
    },
}

/// Wrapper for JSON output of `apply`
#[derive(Debug, Serialize)]
struct ApplyOutput {
    outcome: TransformOutcome,
    schema: Option<SchemaSnapshot>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TEMPORALIZE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("temporalize=info,temporalize_kernel=info"));

    // stdout carries JSON only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<TemporalConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            serde_json::from_str::<TemporalConfig>(&data)
                .with_context(|| format!("parsing {path}"))?
        }
        None => TemporalConfig::default(),
    };

    if let Some(v) = &cli.version_column {
        config.version_column = v.clone();
    }
    if let Some(v) = &cli.start_column {
        config.start_column = v.clone();
    }
    if let Some(v) = &cli.end_column {
        config.end_column = v.clone();
    }
    if let Some(v) = &cli.max_sentinel {
        config.max_sentinel = v.clone();
    }

    config.validate()?;
    Ok(config)
}

fn plan<E: DdlExecutor>(executor: &mut E, config: TemporalConfig, table: &str) -> Result<PlanOutcome> {
    Ok(TemporalTransformer::new(executor, config).plan(table)?)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // ----------------------------
    // Load config
    // ----------------------------
    let config = load_config(&cli)?;
    tracing::info!(
        version_column = %config.version_column,
        start_column = %config.start_column,
        end_column = %config.end_column,
        max_sentinel = %config.max_sentinel,
        command = ?cli.command,
        "configuration loaded"
    );

    // ----------------------------
    // Run command
    // ----------------------------
    let output = match cli.command {
        Command::Inspect { sqlite, table } => {
            let mut exec = SqliteExecutor::open(&sqlite)?;
            let keys = discover_primary_keys(&mut exec, &Dialect::Sqlite, &table)?;
            serde_json::to_value(&keys)?
        }

        Command::Plan {
            table,
            sqlite,
            driver,
            catalog,
        } => {
            let outcome = match (sqlite, driver, catalog) {
                (Some(path), _, _) => plan(&mut SqliteExecutor::open(&path)?, config, &table)?,
                (None, Some(driver), Some(path)) => {
                    let data =
                        fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
                    let rows: Vec<CatalogRow> = serde_json::from_str(&data)
                        .with_context(|| format!("parsing {path}"))?;
                    let mut exec = RecordingExecutor::new(&driver).with_catalog("", rows);
                    plan(&mut exec, config, &table)?
                }
                _ => anyhow::bail!("plan needs --sqlite, or --driver with --catalog"),
            };
            serde_json::to_value(&outcome)?
        }

        Command::Apply {
            sqlite,
            table,
            no_verify,
        } => {
            let mut exec = SqliteExecutor::open(&sqlite)?;
            let dialect = Dialect::detect(exec.driver_name());

            let mut transformer = TemporalTransformer::new(&mut exec, config.clone());
            let output = match transformer.plan(&table)? {
                PlanOutcome::Planned(plan) => {
                    let outcome = transformer.apply(&plan)?;
                    let schema = if no_verify {
                        None
                    } else {
                        Some(verify_postconditions(
                            &mut exec,
                            &dialect,
                            &table,
                            &plan.primary_keys,
                            &config,
                        )?)
                    };
                    ApplyOutput { outcome, schema }
                }
                PlanOutcome::Skipped { table, driver } => ApplyOutput {
                    outcome: TransformOutcome::Skipped { table, driver },
                    schema: None,
                },
            };
            serde_json::to_value(&output)?
        }
    };

    // ----------------------------
    // Output
    // ----------------------------
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
