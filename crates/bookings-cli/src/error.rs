use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] bookings_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Replica task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Replicas diverged: {divergent} of {contexts} contexts differ from the first")]
    Diverged { divergent: usize, contexts: usize },
}
