use thiserror::Error;

/// Errors emitted by strategies and the strategy registry.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// A configured strategy kind cannot be instantiated.
    #[error("failed to load strategy {name}: {message}")]
    Load { name: String, message: String },
    #[error("set-up of strategy {strategy} failed: {message}")]
    SetupFailed { strategy: String, message: String },
    /// The rule cannot be applied to its column.
    #[error("invalid rule for {field}: {message}")]
    Validation { field: String, message: String },
    /// A strategy returned more than one value for a single cell.
    #[error("strategy {strategy} returned {count} values for {field}")]
    ContractViolation {
        strategy: String,
        field: String,
        count: usize,
    },
    #[error("transform of {field} failed: {message}")]
    Transform { field: String, message: String },
    #[error("catalog error: {0}")]
    Catalog(#[from] maskgraph_core::Error),
}
