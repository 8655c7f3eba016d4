use thiserror::Error;

/// Errors raised by the retain-mark store. Nothing is retried internally.
#[derive(Debug, Error)]
pub enum RetainError {
    #[error("failed to insert retain mark for {schema}.{table}: {source}")]
    InsertRetainMarkFailed {
        schema: String,
        table: String,
        #[source]
        source: RetainCause,
    },
    #[error("failed to look up retain mark for {schema}.{table}: {source}")]
    LookupFailed {
        schema: String,
        table: String,
        #[source]
        source: RetainCause,
    },
    #[error("failed to scan retain tables: {0}")]
    Scan(#[source] sqlx::Error),
}

/// Underlying reason of a failed retain operation.
#[derive(Debug, Error)]
pub enum RetainCause {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] maskgraph_core::Error),
    #[error("table has no primary key")]
    NoPrimaryKey,
    #[error("no type information for key column {0}")]
    KeyTypeUnavailable(String),
    #[error("row has no value for key column {0}")]
    MissingKeyValue(String),
    #[error("key column {0} is null")]
    NullKeyValue(String),
}
