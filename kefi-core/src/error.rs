use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("failed to build backend client: {0}")]
    ClientBuild(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
