use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OxidockError {
    /// A pipeline stage was invoked before its predecessor produced output.
    #[error("prerequisite stage not satisfied: run `{0}` first")]
    Prerequisite(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single work item exceeded its allotted wall-clock time.
    #[error("task timed out after {0:?}")]
    TaskTimeout(Duration),

    /// A single work item's operation failed.
    #[error("task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OxidockError>;
