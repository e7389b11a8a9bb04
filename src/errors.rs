// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrondagError {
    #[error("a task with the id '{0}' already exists")]
    DuplicateTask(String),

    #[error("no task or collection named '{0}'")]
    NotFound(String),

    #[error("the run queue is full ({capacity} runs waiting)")]
    QueueFull { capacity: usize },

    #[error("invalid cron expression: {0}")]
    InvalidTrigger(String),

    #[error("arbitrary commands must be run with force")]
    ForcedCommandRequired,

    #[error("task '{task}' has dependent tasks ({dependents:?}); use force to run it anyway")]
    DependentTaskExists {
        task: String,
        dependents: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CrondagError>;
