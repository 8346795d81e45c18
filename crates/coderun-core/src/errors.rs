//! Error types for submission validation, sandbox orchestration and configuration
//!
//! Errors are split by who is at fault. `SubmissionError` is the caller's
//! problem and is reported before any sandbox exists. `SandboxError` covers
//! the container substrate itself. `RunError` wraps substrate failures with
//! the orchestration stage they happened in, which is what the HTTP layer
//! needs to pick a status code. A non-zero exit code from a build or run
//! step is never an error; it travels back as data inside `StepResult`.

use std::path::PathBuf;
use thiserror::Error;

/// Rejections of a submission. The `Display` output is the exact message
/// returned to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Missing code input.")]
    MissingCode,
    #[error("Missing language.")]
    MissingLanguage,
    #[error("Invalid language.")]
    InvalidLanguage,
}

/// Failures of the container substrate.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Exec for command {command:?} did not attach to output streams")]
    Detached { command: Vec<String> },
    #[error("Sandbox backend error: {0}")]
    Backend(String),
    #[error("Sandbox operation cancelled")]
    Cancelled,
}

impl SandboxError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Failure of one `/run` request, tagged with the stage that failed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to stage source archive: {0}")]
    Staging(#[source] std::io::Error),
    #[error("Sandbox unavailable: {0}")]
    SandboxUnavailable(#[source] SandboxError),
    #[error("Failed to inject source into sandbox: {0}")]
    Injection(#[source] SandboxError),
    #[error("Failed to execute step in sandbox: {0}")]
    Execution(#[source] SandboxError),
    #[error("Execution cancelled before completion")]
    Cancelled,
    #[error("Failed to tear down sandbox: {0}")]
    Teardown(#[source] SandboxError),
}

impl RunError {
    /// Folds a pipeline failure into the right variant; a cancelled step is
    /// surfaced as `Cancelled` rather than as an execution failure.
    pub fn from_execution(err: SandboxError) -> Self {
        match err {
            SandboxError::Cancelled => RunError::Cancelled,
            other => RunError::Execution(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
