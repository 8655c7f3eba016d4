use std::collections::BTreeMap;
use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use maskgraph_analyze::{AnalysisIssue, AnalysisSummary};

use crate::redaction::RedactedConnection;

use super::{RegistryResult, write_bytes_atomic, write_json_atomic};

/// Where the analyzed schema metadata comes from.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSource {
    Database { connection: RedactedConnection },
    Snapshot { path: PathBuf },
}

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub engine: String,
    pub rules_path: PathBuf,
    pub run_dir: PathBuf,
    pub source: RunSource,
    pub schema: String,
    pub scope: Vec<String>,
    pub strategies: BTreeMap<String, String>,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
struct RunConfig<'a> {
    run_id: &'a str,
    started_at: String,
    tool_version: &'static str,
    engine: &'a str,
    rules_path: &'a Path,
    source: &'a RunSource,
    schema: &'a str,
    scope: &'a [String],
    strategies: &'a BTreeMap<String, String>,
}

/// Paths of one run's artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub logs_path: PathBuf,
    pub rules_path: PathBuf,
    pub report_path: PathBuf,
}

/// Issues and counters of an analysis, written as `report.json`.
#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub run_id: &'a str,
    pub schema: &'a str,
    pub finished_at: String,
    pub summary: &'a AnalysisSummary,
    pub issues: &'a [AnalysisIssue],
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ");
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));
    create_dir_all(&root)?;

    let paths = RunPaths {
        config_path: root.join("config.json"),
        logs_path: root.join("logs.ndjson"),
        rules_path: root.join("rules.toml"),
        report_path: root.join("report.json"),
        root,
    };

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        tool_version: env!("CARGO_PKG_VERSION"),
        engine: &ctx.engine,
        rules_path: &ctx.rules_path,
        source: &ctx.source,
        schema: &ctx.schema,
        scope: &ctx.scope,
        strategies: &ctx.strategies,
    };
    write_json_atomic(&paths.config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.logs_path)?;

    Ok(paths)
}

/// Write the analyzed rule set into the run directory and, when requested,
/// to `out_path` as well.
pub fn write_rules(
    paths: &RunPaths,
    rules_toml: &str,
    out_path: Option<&Path>,
) -> RegistryResult<()> {
    write_bytes_atomic(&paths.rules_path, rules_toml.as_bytes())?;
    if let Some(out_path) = out_path {
        write_bytes_atomic(out_path, rules_toml.as_bytes())?;
    }
    Ok(())
}

pub fn write_report(paths: &RunPaths, report: &AnalysisReport<'_>) -> RegistryResult<()> {
    write_json_atomic(&paths.report_path, report)
}
