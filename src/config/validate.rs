// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DreamError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DreamError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.scratch, raw.runtime))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_scratch(cfg)?;
    validate_runtime(cfg)?;
    validate_readiness(cfg)?;
    Ok(())
}

fn validate_scratch(cfg: &RawConfigFile) -> Result<()> {
    if let Some(dir) = &cfg.scratch.dir {
        if dir.as_os_str().is_empty() {
            return Err(DreamError::ConfigError(
                "[scratch].dir must not be empty (omit it to use the system temp dir)"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_runtime(cfg: &RawConfigFile) -> Result<()> {
    let rt = &cfg.runtime;
    for (key, value) in [
        ("docker", &rt.docker),
        ("image", &rt.image),
        ("container_name", &rt.container_name),
    ] {
        if value.trim().is_empty() {
            return Err(DreamError::ConfigError(format!(
                "[runtime].{key} must not be empty"
            )));
        }
    }

    if rt.container_name.chars().any(char::is_whitespace) {
        return Err(DreamError::ConfigError(format!(
            "[runtime].container_name must not contain whitespace (got {:?})",
            rt.container_name
        )));
    }

    if rt.start_prefix.first().is_some_and(|p| p.trim().is_empty()) {
        return Err(DreamError::ConfigError(
            "[runtime].start_prefix must start with a program name".to_string(),
        ));
    }

    if rt.probe_timeout_ms == 0 {
        return Err(DreamError::ConfigError(
            "[runtime].probe_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_readiness(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runtime.readiness.max_attempts == 0 {
        return Err(DreamError::ConfigError(
            "[runtime.readiness].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Validate an already-typed config. Kept for callers that build a
/// `RawConfigFile` in code and only want the checks.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}
