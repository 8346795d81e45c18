//! Request-level orchestration of staging, sandbox lifecycle and execution.
//!
//! One call to [`CodeRunner::run`] owns exactly one staged archive and at most
//! one sandbox. Whatever happens after they exist, the sandbox is killed and
//! the archive deleted before `run` returns. The one exception is a sandbox
//! whose creation completes after cancellation; it is killed as soon as the
//! substrate hands it back.

use crate::config::CodeRunConfig;
use crate::errors::{ConfigError, RunError, SandboxError};
use crate::languages::LanguageRegistry;
use crate::pipeline::{ExecutionOutcome, ExecutionPipeline};
use crate::sandbox::{SandboxBackend, SandboxHandle, SandboxManager};
use crate::staging::{PayloadStager, StagedArchive};
use crate::submission::Submission;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared, read-only after construction; clone it freely across tasks.
#[derive(Clone)]
pub struct CodeRunner {
    registry: LanguageRegistry,
    stager: PayloadStager,
    sandboxes: SandboxManager,
    pipeline: ExecutionPipeline,
    work_dir: String,
    base_filename: String,
}

impl CodeRunner {
    pub fn new(
        registry: LanguageRegistry,
        stager: PayloadStager,
        sandboxes: SandboxManager,
        pipeline: ExecutionPipeline,
        work_dir: impl Into<String>,
        base_filename: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            stager,
            sandboxes,
            pipeline,
            work_dir: work_dir.into(),
            base_filename: base_filename.into(),
        }
    }

    /// Wires a runner from validated configuration and a substrate client.
    pub fn from_config(
        config: &CodeRunConfig,
        backend: Arc<dyn SandboxBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.languages.registry()?,
            PayloadStager::new(config.sandbox.scratch_dir()),
            SandboxManager::new(backend, config.sandbox.to_spec()?),
            ExecutionPipeline::new(config.execution.run_policy),
            config.sandbox.work_dir.clone(),
            config.sandbox.base_filename.clone(),
        ))
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// In-sandbox path of the source without its extension.
    pub fn source_base_path(&self) -> String {
        format!(
            "{}/{}",
            self.work_dir.trim_end_matches('/'),
            self.base_filename
        )
    }

    /// Executes a validated submission in a fresh sandbox.
    ///
    /// `cancel` is the watchdog hook: cancelling it abandons the sandbox
    /// open, the injection or the current step, after which teardown
    /// proceeds as on any other path.
    pub async fn run(
        &self,
        submission: &Submission,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, RunError> {
        let language = submission.language();
        let filename = language.source_filename(&self.base_filename);

        let archive = self
            .stager
            .stage(&filename, submission.code())
            .await
            .map_err(RunError::Staging)?;

        let result = self.run_staged(submission, &archive, &cancel).await;

        let archive_path = archive.path().to_path_buf();
        if let Err(e) = archive.remove().await {
            log::error!(
                "Failed to remove staged archive {}: {}",
                archive_path.display(),
                e
            );
        }

        result
    }

    async fn run_staged(
        &self,
        submission: &Submission,
        archive: &StagedArchive,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, RunError> {
        let handle = self.open_sandbox(cancel).await?;

        let result = self.drive(&handle, submission, archive, cancel).await;
        let sandbox_id = handle.id().to_string();
        let teardown = self.sandboxes.close(handle).await;

        match (result, teardown) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(RunError::Teardown(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_err)) => {
                log::error!(
                    "Failed to tear down sandbox {} after error '{}': {}",
                    sandbox_id,
                    e,
                    teardown_err
                );
                Err(e)
            }
        }
    }

    /// Opens the request's sandbox unless `cancel` fires first.
    ///
    /// The create call keeps going on its own task after a cancellation, and
    /// a sandbox it produces late is killed there instead of being leaked.
    async fn open_sandbox(&self, cancel: &CancellationToken) -> Result<SandboxHandle, RunError> {
        let sandboxes = self.sandboxes.clone();
        let mut opening = tokio::spawn(async move { sandboxes.open().await });

        tokio::select! {
            opened = &mut opening => match opened {
                Ok(opened) => opened.map_err(RunError::SandboxUnavailable),
                Err(e) => Err(RunError::SandboxUnavailable(SandboxError::backend(format!(
                    "sandbox open task failed: {}",
                    e
                )))),
            },
            _ = cancel.cancelled() => {
                let sandboxes = self.sandboxes.clone();
                tokio::spawn(async move {
                    if let Ok(Ok(handle)) = opening.await {
                        let sandbox_id = handle.id().to_string();
                        log::warn!("Sandbox {} opened after cancellation, tearing down", sandbox_id);
                        if let Err(e) = sandboxes.close(handle).await {
                            log::error!("Failed to tear down late sandbox {}: {}", sandbox_id, e);
                        }
                    }
                });
                Err(RunError::Cancelled)
            }
        }
    }

    async fn drive(
        &self,
        handle: &SandboxHandle,
        submission: &Submission,
        archive: &StagedArchive,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, RunError> {
        tokio::select! {
            injected = self.sandboxes.inject(handle, archive.path(), &self.work_dir) => {
                injected.map_err(RunError::Injection)?
            }
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
        }

        let outcome = self
            .pipeline
            .execute(
                &self.sandboxes,
                handle,
                submission.language(),
                &self.source_base_path(),
                cancel,
            )
            .await
            .map_err(RunError::from_execution)?;

        log::info!(
            "Sandbox {} finished {} submission: compiler={:?} program={:?}",
            handle.id(),
            submission.language().id,
            outcome.compiler_output.as_ref().map(|s| s.exit_code),
            outcome.program_output.as_ref().map(|s| s.exit_code),
        );
        Ok(outcome)
    }
}
