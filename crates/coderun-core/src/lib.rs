//! Sandboxed execution of untrusted source code.
//!
//! A request flows through three collaborators, composed per request with no
//! shared mutable state:
//!
//! - **Staging** ([`staging`]): wraps the source into a single-entry tar
//!   archive on the host.
//! - **Sandbox lifecycle** ([`sandbox`]): opens an isolated, resource-capped
//!   container, injects the archive and kills the container afterwards.
//! - **Execution pipeline** ([`pipeline`]): runs the language's build steps and
//!   its run step, capturing exit code, stdout and stderr per step.
//!
//! [`runner::CodeRunner`] composes them and guarantees cleanup on every path.

pub mod config;
pub mod errors;
pub mod languages;
pub mod pipeline;
pub mod runner;
pub mod sandbox;
pub mod staging;
pub mod submission;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{CodeRunConfig, ConfigLoader};
pub use errors::{ConfigError, RunError, SandboxError, SubmissionError};
pub use languages::{LanguageDescriptor, LanguageRegistry};
pub use pipeline::{ExecutionOutcome, ExecutionPipeline, RunPolicy};
pub use runner::CodeRunner;
pub use sandbox::{DockerBackend, SandboxBackend, SandboxManager, SandboxSpec, StepResult};
pub use staging::{PayloadStager, StagedArchive};
pub use submission::Submission;
