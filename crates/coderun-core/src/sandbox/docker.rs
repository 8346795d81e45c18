// src/sandbox/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput; // For LogOutput::StdOut, LogOutput::StdErr
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    UploadToContainerOptions as BollardUploadToContainerOptionsQuery,
};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use uuid::Uuid;

use super::{SandboxBackend, SandboxSpec, StepResult};
use crate::errors::SandboxError;

/// Sandbox substrate backed by the local Docker daemon.
///
/// `Docker` is a cheap handle over a shared connection pool; one instance is
/// built at startup and shared by every request.
#[derive(Clone)]
pub struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    pub fn connect_local() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

/// Container body for an idle, resource-capped, unprivileged sandbox.
pub(crate) fn container_body(spec: &SandboxSpec) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.entrypoint.clone()),
        // A TTY with open stdin keeps the idle shell from exiting.
        tty: Some(true),
        open_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        network_disabled: Some(!spec.networking_enabled),
        host_config: Some(HostConfig {
            auto_remove: Some(true),
            cpu_shares: Some(spec.cpu_shares),
            memory: Some(spec.memory_bytes),
            runtime: spec.runtime.clone(),
            privileged: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A kill that finds the container missing (404) or stopped (409) means the
/// sandbox is already gone.
pub(crate) fn is_already_gone(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404 | 409,
            ..
        }
    )
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("coderun-{}", Uuid::new_v4())),
            ..Default::default()
        });

        let container = self
            .docker
            .create_container(options, container_body(spec))
            .await?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
        {
            // Auto-remove only kicks in for containers that ran.
            log::warn!("Failed to start container {}: {}", container.id, e);
            let remove = Some(BollardRemoveContainerOptionsQuery {
                force: true,
                ..Default::default()
            });
            if let Err(remove_err) = self.docker.remove_container(&container.id, remove).await {
                log::error!(
                    "Failed to remove unstarted container {}: {}",
                    container.id,
                    remove_err
                );
            }
            return Err(e.into());
        }

        Ok(container.id)
    }

    async fn upload_archive(
        &self,
        sandbox_id: &str,
        destination: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError> {
        let options = Some(BollardUploadToContainerOptionsQuery {
            path: destination.to_string(),
            ..Default::default()
        });
        self.docker
            .upload_to_container(sandbox_id, options, bollard::body_full(archive))
            .await?;
        Ok(())
    }

    async fn exec(&self, sandbox_id: &str, command: &[String]) -> Result<StepResult, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                sandbox_id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    privileged: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match self.docker.start_exec(&exec.id, None::<StartExecOptions>).await? {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk? {
                        LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                        LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                        _ => {}
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(SandboxError::Detached {
                    command: command.to_vec(),
                })
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        // The stream only ends once the process has exited, so a missing
        // code means the daemon lost track of it.
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(StepResult::from_streams(exit_code, &stdout, &stderr))
    }

    async fn kill(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        match self
            .docker
            .kill_container(sandbox_id, None::<BollardKillContainerOptionsQuery>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_already_gone(&e) => {
                log::debug!("Sandbox {} already gone: {}", sandbox_id, e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
