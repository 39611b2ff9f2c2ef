use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read saga definition at '{path}'")]
    ReadDefinition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse saga definition at '{path}'")]
    ParseDefinition {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid saga definition")]
    InvalidSaga(#[from] saga_engine::BuilderError),

    #[error("--input is not valid JSON")]
    InvalidInput(#[source] serde_json::Error),

    #[error("failed to render result as JSON")]
    RenderJson(#[source] serde_json::Error),

    #[error("configuration error")]
    Config(#[from] saga_orchestrator::ConfigError),

    #[error("orchestrator error")]
    Orchestrator(#[from] saga_orchestrator::OrchestratorError),

    #[error("failed to start async runtime")]
    Runtime(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
