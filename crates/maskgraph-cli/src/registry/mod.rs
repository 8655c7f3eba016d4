mod atomic;
mod logging;
mod run;

use atomic::{write_bytes_atomic, write_json_atomic};
pub use logging::init_run_logging;
pub use run::{AnalysisReport, RunContext, RunSource, start_run, write_report, write_rules};

use thiserror::Error;

/// Errors raised while writing run artifacts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("logging error: {0}")]
    Logging(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
