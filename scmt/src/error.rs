//! Error handling for the `scmt` CLI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmtError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] scmc_driver::DriverError),
}

pub type Result<T> = std::result::Result<T, ScmtError>;
