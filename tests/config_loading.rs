// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use dreamrunner::config::{PathStyle, load_and_validate, load_or_default};
use dreamrunner::errors::DreamError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_config_is_loaded() {
    let file = config_file(
        r#"
[scratch]
dir = "/var/tmp/dreams"

[runtime]
docker = "podman"
image = "local/dream:latest"
container_name = "dream-one"
start_prefix = ["toolbox", "run", "--"]
path_style = "toolbox"
probe_timeout_ms = 500

[runtime.readiness]
max_attempts = 3
interval_ms = 10
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.scratch_dir(), PathBuf::from("/var/tmp/dreams"));
    assert_eq!(cfg.runtime.docker, "podman");
    assert_eq!(cfg.runtime.start_prefix, vec!["toolbox", "run", "--"]);
    assert_eq!(cfg.runtime.path_style, PathStyle::Toolbox);
    assert_eq!(cfg.runtime.probe_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.runtime.readiness.max_attempts, 3);
    assert_eq!(cfg.runtime.readiness.interval(), Duration::from_millis(10));
    // Unset keys keep their defaults.
    assert_eq!(cfg.runtime.teardown_timeout(), Duration::from_secs(60));
}

#[test]
fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("Dreamrunner.toml")).unwrap();

    assert_eq!(cfg.runtime.docker, "docker");
    assert_eq!(cfg.runtime.image, "muelmx/neuralart_exec");
    assert_eq!(cfg.runtime.readiness.max_attempts, 2400);
    assert_eq!(cfg.scratch_dir(), std::env::temp_dir().join("dreamdata"));
}

#[test]
fn invalid_container_name_returns_config_error() {
    let file = config_file(
        r#"
[runtime]
container_name = "two words"
"#,
    );

    match load_and_validate(file.path()) {
        Err(DreamError::ConfigError(msg)) => assert!(msg.contains("container_name")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn malformed_toml_returns_toml_error() {
    let file = config_file("[runtime\ndocker = ");

    assert!(matches!(
        load_or_default(file.path()),
        Err(DreamError::TomlError(_))
    ));
}

#[test]
fn unknown_path_style_is_rejected() {
    let file = config_file(
        r#"
[runtime]
path_style = "sideways"
"#,
    );

    assert!(load_and_validate(file.path()).is_err());
}
