//! Configuration loader for YAML files

use crate::config::types::CodeRunConfig;
use crate::errors::ConfigError;
use std::path::Path;
use tokio::fs;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "coderun.yaml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given. Without a path, `coderun.yaml` is used if it
    /// exists and built-in defaults otherwise.
    pub async fn load(path: Option<&Path>) -> Result<CodeRunConfig, ConfigError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if fs::try_exists(default_path).await.unwrap_or(false) {
                    Self::from_file(default_path).await
                } else {
                    log::info!(
                        "No {} found, using built-in configuration",
                        DEFAULT_CONFIG_PATH
                    );
                    let config = CodeRunConfig::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CodeRunConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<CodeRunConfig, ConfigError> {
        // An empty document deserializes as null rather than an empty map.
        let config: CodeRunConfig = if content.trim().is_empty() {
            CodeRunConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }
}
