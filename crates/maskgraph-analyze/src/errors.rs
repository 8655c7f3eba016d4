use thiserror::Error;

use maskgraph_strategy::StrategyError;

/// Failures that abort an analysis run.
///
/// Problems with individual rules or dependants are not errors; they are
/// reported as [`crate::AnalysisIssue`]s.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("catalog error: {0}")]
    Catalog(#[from] maskgraph_core::Error),
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),
}
