//! Sandbox lifecycle: open, inject, exec and close of isolated containers.
//!
//! The container substrate sits behind [`SandboxBackend`] so the process-wide
//! client can be shared read-only between requests and swapped for a fake in
//! tests. [`SandboxManager`] owns the per-process sandbox shape and hands out
//! [`SandboxHandle`]s; closing consumes the handle, so no sandbox can be torn
//! down twice.

use crate::errors::SandboxError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub mod docker;

pub use docker::DockerBackend;

/// Exit code and demultiplexed output of one command run inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl StepResult {
    /// Builds a result from raw stream bytes. Invalid UTF-8 is replaced
    /// rather than rejected, since untrusted programs may print anything.
    pub fn from_streams(exit_code: i64, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            exit_code,
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Shape of every sandbox this process creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub image: String,
    pub runtime: Option<String>,
    pub cpu_shares: i64,
    pub memory_bytes: i64,
    pub networking_enabled: bool,
    /// Long-lived idle command that keeps the container up between execs.
    pub entrypoint: Vec<String>,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self {
            image: "coderun/sandbox:latest".to_string(),
            runtime: None,
            cpu_shares: 512,
            memory_bytes: 100 * 1024 * 1024,
            networking_enabled: false,
            entrypoint: vec!["/bin/sh".to_string()],
        }
    }
}

/// Container substrate operations. Each call is scoped to one sandbox id.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Creates and starts a detached sandbox, returning its id.
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError>;

    /// Extracts a tar archive into `destination` inside the sandbox.
    async fn upload_archive(
        &self,
        sandbox_id: &str,
        destination: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError>;

    /// Runs `command` to completion, capturing stdout and stderr separately.
    async fn exec(&self, sandbox_id: &str, command: &[String]) -> Result<StepResult, SandboxError>;

    /// Forcibly stops the sandbox; the substrate removes it afterwards.
    async fn kill(&self, sandbox_id: &str) -> Result<(), SandboxError>;
}

/// Exclusive ownership of one open sandbox. Deliberately not `Clone`.
#[derive(Debug)]
pub struct SandboxHandle {
    id: String,
}

impl SandboxHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Clone)]
pub struct SandboxManager {
    backend: Arc<dyn SandboxBackend>,
    spec: SandboxSpec,
}

impl SandboxManager {
    pub fn new(backend: Arc<dyn SandboxBackend>, spec: SandboxSpec) -> Self {
        Self { backend, spec }
    }

    pub async fn open(&self) -> Result<SandboxHandle, SandboxError> {
        let id = self.backend.create(&self.spec).await?;
        log::info!("Opened sandbox {} from image {}", id, self.spec.image);
        Ok(SandboxHandle { id })
    }

    /// Reads the whole archive and expands it at `destination_dir`.
    pub async fn inject(
        &self,
        handle: &SandboxHandle,
        archive_path: &Path,
        destination_dir: &str,
    ) -> Result<(), SandboxError> {
        let contents = tokio::fs::read(archive_path).await?;
        log::debug!(
            "Injecting {} bytes into sandbox {} at {}",
            contents.len(),
            handle.id,
            destination_dir
        );
        self.backend
            .upload_archive(&handle.id, destination_dir, Bytes::from(contents))
            .await
    }

    pub async fn exec(
        &self,
        handle: &SandboxHandle,
        command: &[String],
    ) -> Result<StepResult, SandboxError> {
        log::debug!("Sandbox {} exec {:?}", handle.id, command);
        let result = self.backend.exec(&handle.id, command).await?;
        log::debug!(
            "Sandbox {} exec {:?} exited with {}",
            handle.id,
            command,
            result.exit_code
        );
        Ok(result)
    }

    /// Kills the sandbox. Consumes the handle so teardown runs at most once.
    pub async fn close(&self, handle: SandboxHandle) -> Result<(), SandboxError> {
        self.backend.kill(&handle.id).await?;
        log::info!("Closed sandbox {}", handle.id);
        Ok(())
    }
}
