//! Error types for wheelhouse.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("git query failed: {0}")]
    GitQueryFailed(String),

    #[error("invalid trigger context: {0}")]
    InvalidTrigger(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
