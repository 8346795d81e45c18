//! In-memory sandbox backend for tests.
//!
//! Records every substrate call and replays scripted exec outcomes in order.
//! Exec calls with nothing scripted succeed with empty output.

use crate::errors::SandboxError;
use crate::sandbox::{SandboxBackend, SandboxSpec, StepResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted outcome of one exec call.
#[derive(Debug, Clone)]
pub enum FakeExec {
    Complete(StepResult),
    Fail(String),
    /// Never returns; used to exercise cancellation.
    Hang,
}

impl FakeExec {
    pub fn exit(exit_code: i64, stdout: &str, stderr: &str) -> Self {
        FakeExec::Complete(StepResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }
}

#[derive(Default)]
struct Calls {
    specs: Vec<SandboxSpec>,
    created: Vec<String>,
    uploads: Vec<(String, String, Vec<u8>)>,
    execs: Vec<(String, Vec<String>)>,
    killed: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    next_id: AtomicUsize,
    calls: Mutex<Calls>,
    script: Mutex<VecDeque<FakeExec>>,
    fail_create: Mutex<Option<String>>,
    fail_upload: Mutex<Option<String>>,
    fail_kill: Mutex<Option<String>>,
    create_delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues exec outcomes, consumed one per exec call.
    pub fn with_script(self, script: impl IntoIterator<Item = FakeExec>) -> Self {
        self.script.lock().unwrap().extend(script);
        self
    }

    pub fn failing_create(self, message: &str) -> Self {
        *self.fail_create.lock().unwrap() = Some(message.to_string());
        self
    }

    /// Makes every create call take `delay` before the sandbox exists.
    pub fn slow_create(self, delay: Duration) -> Self {
        *self.create_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn failing_upload(self, message: &str) -> Self {
        *self.fail_upload.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn failing_kill(self, message: &str) -> Self {
        *self.fail_kill.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn create_count(&self) -> usize {
        self.calls.lock().unwrap().specs.len()
    }

    pub fn specs(&self) -> Vec<SandboxSpec> {
        self.calls.lock().unwrap().specs.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls.lock().unwrap().created.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.calls.lock().unwrap().uploads.clone()
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().execs.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.calls.lock().unwrap().killed.clone()
    }

    /// Sandboxes created and never killed.
    pub fn running(&self) -> Vec<String> {
        let calls = self.calls.lock().unwrap();
        calls
            .created
            .iter()
            .filter(|id| !calls.killed.contains(id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SandboxBackend for FakeBackend {
    async fn create(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut calls = self.calls.lock().unwrap();
        calls.specs.push(spec.clone());
        if let Some(message) = self.fail_create.lock().unwrap().clone() {
            return Err(SandboxError::backend(message));
        }
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        calls.created.push(id.clone());
        Ok(id)
    }

    async fn upload_archive(
        &self,
        sandbox_id: &str,
        destination: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError> {
        if let Some(message) = self.fail_upload.lock().unwrap().clone() {
            return Err(SandboxError::backend(message));
        }
        self.calls.lock().unwrap().uploads.push((
            sandbox_id.to_string(),
            destination.to_string(),
            archive.to_vec(),
        ));
        Ok(())
    }

    async fn exec(&self, sandbox_id: &str, command: &[String]) -> Result<StepResult, SandboxError> {
        self.calls
            .lock()
            .unwrap()
            .execs
            .push((sandbox_id.to_string(), command.to_vec()));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(FakeExec::Complete(result)) => Ok(result),
            Some(FakeExec::Fail(message)) => Err(SandboxError::backend(message)),
            Some(FakeExec::Hang) => std::future::pending().await,
            None => Ok(StepResult::default()),
        }
    }

    async fn kill(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        if let Some(message) = self.fail_kill.lock().unwrap().clone() {
            return Err(SandboxError::backend(message));
        }
        self.calls.lock().unwrap().killed.push(sandbox_id.to_string());
        Ok(())
    }
}
