use std::path::PathBuf;

/// Errors raised by the agent, its collaborators and the training loop.
#[derive(Debug, thiserror::Error)]
pub enum DqnError {
    #[error("malformed observation: {0}")]
    MalformedObservation(String),

    #[error("cannot sample {requested} transitions, memory holds {available}")]
    InsufficientSamples { requested: usize, available: usize },

    #[error("action {action} outside action space of size {action_count}")]
    InvalidActionIndex { action: usize, action_count: usize },

    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to write history: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, DqnError>;
