mod redaction;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{ArgGroup, Args, Parser, Subcommand};
use maskgraph_analyze::{AnalyzeError, Analyzer};
use maskgraph_core::{Error as CoreError, RuleSet};
use maskgraph_introspect::{PostgresCatalog, SchemaCatalog, SnapshotCatalog};
use maskgraph_strategy::{StrategyContext, StrategyError, StrategyRegistry};
use redaction::redact_connection_string;
use registry::{
    AnalysisReport, RunContext, RunSource, init_run_logging, start_run, write_report, write_rules,
};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error("analysis failed: {0}")]
    Analyze(#[from] AnalyzeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "maskgraph", version, about = "Anonymization rule analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Complete a rule file with key dependants and drop what no longer fits
    /// the schema.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["conn", "snapshot"])))]
struct AnalyzeArgs {
    /// Rule file to analyze (TOML).
    #[arg(long, value_name = "FILE")]
    rules: PathBuf,
    /// Connection string of the original database.
    #[arg(long, value_name = "CONNECTION_STRING")]
    conn: Option<String>,
    /// schema.json snapshot to analyze against instead of a live database.
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
    /// Optional output path for the analyzed rule file.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    #[arg(long, default_value_t = 2)]
    max_connections: u32,
}

/// Schema metadata source selected on the command line.
enum Source {
    Database(String),
    Snapshot(PathBuf),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
    };
    if let Err(err) = &result {
        tracing::error!(event = "run_failed", error = %err);
    }
    result
}

async fn run_analyze(args: AnalyzeArgs) -> Result<(), CliError> {
    let AnalyzeArgs {
        rules,
        conn,
        snapshot,
        out,
        run_dir,
        max_connections,
    } = args;

    let source = match (conn, snapshot) {
        (Some(conn), None) => Source::Database(conn),
        (None, Some(path)) => Source::Snapshot(path),
        _ => {
            return Err(CliError::InvalidConfig(
                "use exactly one of --conn or --snapshot".to_string(),
            ));
        }
    };
    let (engine, run_source) = match &source {
        Source::Database(conn) => (
            detect_engine(conn)?,
            RunSource::Database {
                connection: redact_connection_string(conn),
            },
        ),
        Source::Snapshot(path) => ("snapshot", RunSource::Snapshot { path: path.clone() }),
    };

    let input = std::fs::read_to_string(&rules)?;
    let rule_set = RuleSet::from_toml_str(&input)?;

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        engine: engine.to_string(),
        rules_path: rules.clone(),
        run_dir,
        source: run_source,
        schema: rule_set.schema_name.clone(),
        scope: rule_set.scope.tables().map(str::to_string).collect(),
        strategies: rule_set.strategies.clone(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(
        event = "run_started",
        run_id = %run_id,
        engine = %engine,
        rules = %rules.display()
    );
    let timer = Instant::now();

    let catalog = open_catalog(&source, max_connections).await?;
    tracing::info!(event = "catalog_opened", engine = catalog.engine());

    let context = StrategyContext::new(Arc::clone(&catalog));
    let strategies = StrategyRegistry::from_mapping(&rule_set.strategies, &context)?;
    tracing::info!(event = "strategies_loaded", count = strategies.len());

    let outcome = Analyzer::new(catalog.as_ref(), &strategies)
        .analyze(rule_set)
        .await?;

    let rules_toml = outcome.rule_set.to_toml_string()?;
    write_rules(&run_paths, &rules_toml, out.as_deref())?;
    tracing::info!(event = "rules_written", path = %run_paths.rules_path.display());
    if let Some(out) = &out {
        tracing::info!(event = "rules_exported", path = %out.display());
    }

    let report = AnalysisReport {
        run_id: &run_id,
        schema: &outcome.rule_set.schema_name,
        finished_at: chrono::Utc::now().to_rfc3339(),
        summary: &outcome.summary,
        issues: &outcome.issues,
    };
    write_report(&run_paths, &report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(
        event = "run_finished",
        status = "success",
        rules = outcome.rule_set.rules.len(),
        issues = outcome.issues.len(),
        duration_ms = duration_ms
    );

    Ok(())
}

async fn open_catalog(
    source: &Source,
    max_connections: u32,
) -> Result<Arc<dyn SchemaCatalog>, CliError> {
    match source {
        Source::Database(conn) => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(conn)
                .await?;
            Ok(Arc::new(PostgresCatalog::new(pool)))
        }
        Source::Snapshot(path) => Ok(Arc::new(SnapshotCatalog::from_path(path)?)),
    }
}

fn detect_engine(conn: &str) -> Result<&'static str, CliError> {
    if conn.starts_with("postgres://") || conn.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(CliError::UnsupportedEngine(
            redact_connection_string(conn).redacted,
        ))
    }
}
