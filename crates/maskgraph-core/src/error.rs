use thiserror::Error;

/// Core error type shared across maskgraph crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Catalog query or adapter failure.
    #[error("database error: {0}")]
    Db(String),
    /// A schema snapshot violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A rule lists its own field as a dependant.
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    /// Rule file could not be decoded or encoded.
    #[error("config error: {0}")]
    Config(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(value: toml::ser::Error) -> Self {
        Error::Config(value.to_string())
    }
}

/// Convenience alias for results returned by maskgraph crates.
pub type Result<T> = std::result::Result<T, Error>;
