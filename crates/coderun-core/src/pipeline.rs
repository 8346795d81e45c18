//! Build and run steps for one submission inside an open sandbox.
//!
//! Steps run strictly in sequence: every build command in declared order,
//! then the single run command. Each step's exit code, stdout and stderr are
//! captured independently. A non-zero exit code is data, not an error.
//!
//! No wall-clock limit is imposed here. Every step races the caller's
//! [`CancellationToken`] instead, so an external watchdog can abandon a hung
//! step and let the caller tear the sandbox down.

use crate::errors::SandboxError;
use crate::languages::LanguageDescriptor;
use crate::sandbox::{SandboxHandle, SandboxManager, StepResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Whether the run step depends on the build steps succeeding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Run the program even after a failed build; the caller reads the
    /// compiler exit code alongside the (likely failing) program result.
    #[default]
    Always,
    /// Skip the run step when any build step exits non-zero.
    OnBuildSuccess,
}

/// Aggregate result returned for a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Last build step executed; `None` for languages without a build.
    pub compiler_output: Option<StepResult>,
    /// `None` only when the run step was gated off by a failed build.
    pub program_output: Option<StepResult>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPipeline {
    policy: RunPolicy,
}

impl ExecutionPipeline {
    pub fn new(policy: RunPolicy) -> Self {
        Self { policy }
    }

    /// Runs the descriptor's steps against the source staged at
    /// `<source_base_path>.<extension>`.
    pub async fn execute(
        &self,
        sandboxes: &SandboxManager,
        handle: &SandboxHandle,
        language: &LanguageDescriptor,
        source_base_path: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let mut compiler_output = None;
        let mut build_failed = false;

        for command in language.build_commands(source_base_path) {
            let result = run_step(sandboxes, handle, &command, cancel).await?;
            build_failed = !result.succeeded();
            compiler_output = Some(result);
            if build_failed {
                // Later build steps build on earlier ones.
                log::info!(
                    "Build step {:?} failed in sandbox {}",
                    command,
                    handle.id()
                );
                break;
            }
        }

        let program_output = if build_failed && self.policy == RunPolicy::OnBuildSuccess {
            log::debug!("Skipping run step for {} after failed build", language.id);
            None
        } else {
            let command = language.run_command(source_base_path);
            Some(run_step(sandboxes, handle, &command, cancel).await?)
        };

        Ok(ExecutionOutcome {
            compiler_output,
            program_output,
        })
    }
}

async fn run_step(
    sandboxes: &SandboxManager,
    handle: &SandboxHandle,
    command: &[String],
    cancel: &CancellationToken,
) -> Result<StepResult, SandboxError> {
    tokio::select! {
        result = sandboxes.exec(handle, command) => result,
        _ = cancel.cancelled() => {
            log::warn!("Step {:?} in sandbox {} cancelled", command, handle.id());
            Err(SandboxError::Cancelled)
        }
    }
}
