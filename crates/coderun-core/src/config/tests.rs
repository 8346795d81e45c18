//! Tests for configuration parsing, defaults and validation

use super::*;
use crate::errors::ConfigError;
use crate::pipeline::RunPolicy;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_empty_config_uses_defaults() {
    let config = ConfigLoader::from_str("").unwrap();

    assert_eq!(config.server.bind_addr, "127.0.0.1:5000");
    assert_eq!(config.sandbox.cpu_shares, 512);
    assert!(!config.sandbox.networking_enabled);
    assert_eq!(config.sandbox.work_dir, "/sandbox");
    assert_eq!(config.sandbox.base_filename, "main");
    assert_eq!(config.languages.allowed, vec!["c", "cpp", "js", "py"]);
    assert_eq!(config.execution.run_policy, RunPolicy::Always);
    assert_eq!(config.execution.timeout_secs, None);
}

#[test]
fn test_full_config_is_parsed() {
    let yaml = r#"
server:
  bind_addr: "0.0.0.0:8080"
  enable_cors: false
sandbox:
  image: "runner:2"
  runtime: runsc
  memory_limit: 256m
  cpu_shares: 1024
  networking_enabled: true
  terminal: "/bin/bash -i"
  work_dir: /tmp/untrusted
  base_filename: program
languages:
  allowed: [py, ruby]
  definitions:
    - id: ruby
      extension: rb
      run: ["ruby", "{source}"]
execution:
  run_policy: on_build_success
  timeout_secs: 10
"#;
    let config = ConfigLoader::from_str(yaml).unwrap();
    let spec = config.sandbox.to_spec().unwrap();
    let registry = config.languages.registry().unwrap();

    assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
    assert!(!config.server.enable_cors);
    assert_eq!(spec.image, "runner:2");
    assert_eq!(spec.runtime.as_deref(), Some("runsc"));
    assert_eq!(spec.memory_bytes, 256 * 1024 * 1024);
    assert_eq!(spec.cpu_shares, 1024);
    assert!(spec.networking_enabled);
    assert_eq!(spec.entrypoint, vec!["/bin/bash", "-i"]);
    assert_eq!(registry.ids(), ["py".to_string(), "ruby".to_string()].as_slice());
    assert_eq!(config.execution.run_policy, RunPolicy::OnBuildSuccess);
    assert_eq!(config.execution.timeout_secs, Some(10));
}

#[test]
fn test_memory_limit_units() {
    assert_eq!(parse_memory_limit("100m").unwrap(), 100 * 1024 * 1024);
    assert_eq!(parse_memory_limit("100MB").unwrap(), 100 * 1024 * 1024);
    assert_eq!(parse_memory_limit("2g").unwrap(), 2 * 1024 * 1024 * 1024);
    assert_eq!(parse_memory_limit("64k").unwrap(), 64 * 1024);
    assert_eq!(parse_memory_limit("4096").unwrap(), 4096);
    assert_eq!(parse_memory_limit("4096b").unwrap(), 4096);
    assert!(parse_memory_limit("lots").is_err());
    assert!(parse_memory_limit("0m").is_err());
    assert!(parse_memory_limit("").is_err());
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "sandbox:\n  image: \"\"\n",
        "sandbox:\n  cpu_shares: 1\n",
        "sandbox:\n  work_dir: relative/dir\n",
        "sandbox:\n  base_filename: a/b\n",
        "sandbox:\n  memory_limit: plenty\n",
        "sandbox:\n  terminal: \"  \"\n",
        "languages:\n  allowed: [cobol]\n",
        "execution:\n  timeout_secs: 0\n",
    ];
    for yaml in cases {
        let err = ConfigLoader::from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{yaml}: {err}");
    }
}

#[test]
fn test_malformed_yaml_is_a_parse_error() {
    let err = ConfigLoader::from_str("sandbox: [unclosed").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sandbox:\n  image: from-file:1").unwrap();

    let config = ConfigLoader::load(Some(file.path())).await.unwrap();
    assert_eq!(config.sandbox.image, "from-file:1");
}

#[tokio::test]
async fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");

    let err = ConfigLoader::load(Some(&missing)).await.unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
