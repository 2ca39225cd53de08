// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scratch]
/// dir = "/var/tmp/dreamdata"
///
/// [runtime]
/// docker = "docker"
/// image = "muelmx/neuralart_exec"
/// container_name = "dreamrunner-job"
/// start_prefix = ["./start_toolbox.sh"]
/// path_style = "toolbox"
///
/// [runtime.readiness]
/// max_attempts = 2400
/// interval_ms = 100
/// ```
///
/// All sections are optional and have reasonable defaults. This is the
/// unvalidated form; the rest of the crate works with [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scratch: ScratchSection,

    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Validated configuration.
///
/// Can only be obtained through `TryFrom<RawConfigFile>` (see
/// `config::validate`), so holders may rely on its invariants.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scratch: ScratchSection,
    pub runtime: RuntimeSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(scratch: ScratchSection, runtime: RuntimeSection) -> Self {
        Self { scratch, runtime }
    }

    /// Scratch directory shared with the container.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch
            .dir
            .clone()
            .unwrap_or_else(default_scratch_dir)
    }
}

/// `[scratch]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScratchSection {
    /// Directory holding job inputs and the `output/` folder. Defaults to
    /// `<system temp>/dreamdata`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("dreamdata")
}

/// How host paths are written in the `-v host:/data` mount argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    /// Pass the host path through unchanged.
    #[default]
    Native,
    /// Docker Toolbox on Windows: `C:\Users\x` becomes `//c/Users/x`.
    Toolbox,
}

/// `[runtime]` section: how to reach the container runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Docker CLI executable.
    #[serde(default = "default_docker")]
    pub docker: String,

    /// Image containing the processing scripts.
    #[serde(default = "default_image")]
    pub image: String,

    /// Name given to the job container, used again on teardown.
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Program (plus arguments) prepended to every docker invocation, e.g.
    /// a script that sets up the Docker Toolbox environment.
    #[serde(default)]
    pub start_prefix: Vec<String>,

    #[serde(default)]
    pub path_style: PathStyle,

    /// Upper bound for a single readiness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound for removing the job container.
    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,

    #[serde(default)]
    pub readiness: ReadinessSection,
}

fn default_docker() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "muelmx/neuralart_exec".to_string()
}

fn default_container_name() -> String {
    "dreamrunner-job".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_teardown_timeout_ms() -> u64 {
    60_000
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            docker: default_docker(),
            image: default_image(),
            container_name: default_container_name(),
            start_prefix: Vec::new(),
            path_style: PathStyle::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
            readiness: ReadinessSection::default(),
        }
    }
}

impl RuntimeSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// `[runtime.readiness]` section: bounded retry while waiting for the
/// runtime to come up.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    2_400
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReadinessSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
