//! Configuration type definitions for the code runner
//!
//! Every section and field is optional in YAML; omitted values fall back to
//! the defaults below, so an empty file (or no file at all) yields a working
//! service that runs the four built-in languages.

use crate::errors::ConfigError;
use crate::languages::{default_allowed_languages, LanguageDescriptor, LanguageRegistry};
use crate::pipeline::RunPolicy;
use crate::sandbox::SandboxSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeRunConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub languages: LanguagesConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default = "default_true")]
    pub enable_logging: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            cors_origins: Vec::new(),
            max_body_size: default_max_body_size(),
            enable_logging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_image")]
    pub image: String,
    /// OCI runtime, e.g. `runsc`; the daemon default when unset.
    #[serde(default)]
    pub runtime: Option<String>,
    /// Docker-style size such as `100m` or `1g`.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,
    #[serde(default = "default_cpu_shares")]
    pub cpu_shares: i64,
    #[serde(default)]
    pub networking_enabled: bool,
    #[serde(default = "default_terminal")]
    pub terminal: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    /// Host directory for staged archives; the system temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            image: default_image(),
            runtime: None,
            memory_limit: default_memory_limit(),
            cpu_shares: default_cpu_shares(),
            networking_enabled: false,
            terminal: default_terminal(),
            work_dir: default_work_dir(),
            base_filename: default_base_filename(),
            scratch_dir: None,
        }
    }
}

impl SandboxSettings {
    pub fn to_spec(&self) -> Result<SandboxSpec, ConfigError> {
        let entrypoint: Vec<String> = self
            .terminal
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if entrypoint.is_empty() {
            return Err(ConfigError::invalid("sandbox.terminal must not be empty"));
        }

        Ok(SandboxSpec {
            image: self.image.clone(),
            runtime: self.runtime.clone().filter(|r| !r.is_empty()),
            cpu_shares: self.cpu_shares,
            memory_bytes: parse_memory_limit(&self.memory_limit)?,
            networking_enabled: self.networking_enabled,
            entrypoint,
        })
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesConfig {
    #[serde(default = "default_allowed_languages")]
    pub allowed: Vec<String>,
    /// Extra or overriding descriptors.
    #[serde(default)]
    pub definitions: Vec<LanguageDescriptor>,
}

impl Default for LanguagesConfig {
    fn default() -> Self {
        Self {
            allowed: default_allowed_languages(),
            definitions: Vec::new(),
        }
    }
}

impl LanguagesConfig {
    pub fn registry(&self) -> Result<LanguageRegistry, ConfigError> {
        LanguageRegistry::new(&self.allowed, &self.definitions)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub run_policy: RunPolicy,
    /// Wall-clock budget enforced by the server's watchdog. Unlimited when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CodeRunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.image.trim().is_empty() {
            return Err(ConfigError::invalid("sandbox.image must not be empty"));
        }
        if self.sandbox.cpu_shares < 2 {
            return Err(ConfigError::invalid(format!(
                "sandbox.cpu_shares must be at least 2, got {}",
                self.sandbox.cpu_shares
            )));
        }
        if !self.sandbox.work_dir.starts_with('/') {
            return Err(ConfigError::invalid(format!(
                "sandbox.work_dir must be an absolute path, got '{}'",
                self.sandbox.work_dir
            )));
        }
        let base = &self.sandbox.base_filename;
        if base.is_empty() || base.contains('/') || base == "." || base == ".." {
            return Err(ConfigError::invalid(format!(
                "sandbox.base_filename must be a plain file name, got '{}'",
                base
            )));
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(ConfigError::invalid("execution.timeout_secs must be positive"));
        }
        self.sandbox.to_spec()?;
        self.languages.registry()?;
        Ok(())
    }
}

/// Parses sizes like `100m`, `512MB`, `1g` or a plain byte count.
pub fn parse_memory_limit(value: &str) -> Result<i64, ConfigError> {
    let lower = value.trim().to_ascii_lowercase();
    let unitless = lower.strip_suffix('b').unwrap_or(lower.as_str());
    let (digits, multiplier) = if let Some(d) = unitless.strip_suffix('k') {
        (d, 1024_i64)
    } else if let Some(d) = unitless.strip_suffix('m') {
        (d, 1024 * 1024)
    } else if let Some(d) = unitless.strip_suffix('g') {
        (d, 1024 * 1024 * 1024)
    } else {
        (unitless, 1)
    };

    let amount: i64 = digits
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(format!("Invalid memory limit '{}'", value)))?;
    if amount <= 0 {
        return Err(ConfigError::invalid(format!(
            "Memory limit must be positive, got '{}'",
            value
        )));
    }
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::invalid(format!("Memory limit '{}' is too large", value)))
}

fn default_bind_addr() -> String { "127.0.0.1:5000".to_string() }
fn default_max_body_size() -> usize { 1024 * 1024 }
fn default_true() -> bool { true }
fn default_image() -> String { "coderun/sandbox:latest".to_string() }
fn default_memory_limit() -> String { "100m".to_string() }
fn default_cpu_shares() -> i64 { 512 }
fn default_terminal() -> String { "/bin/sh".to_string() }
fn default_work_dir() -> String { "/sandbox".to_string() }
fn default_base_filename() -> String { "main".to_string() }
