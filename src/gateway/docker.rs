// src/gateway/docker.rs

//! Docker-backed [`ContainerRuntimeGateway`].

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{BoxFuture, ContainerRuntimeGateway, LaunchCommand, LaunchRequest};
use crate::config::{ConfigFile, PathStyle, RuntimeSection};
use crate::errors::{DreamError, Result};
use crate::types::JobKind;

/// Mount point of the scratch directory inside the container.
const CONTAINER_DATA_DIR: &str = "/data";

#[derive(Debug, Clone)]
pub struct DockerGateway {
    runtime: RuntimeSection,
}

impl DockerGateway {
    pub fn new(runtime: RuntimeSection) -> Self {
        Self { runtime }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.runtime.clone())
    }

    pub fn runtime(&self) -> &RuntimeSection {
        &self.runtime
    }

    /// `docker <args>`, wrapped in the configured start prefix.
    fn docker<I, S>(&self, args: I) -> LaunchCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base = match LaunchCommand::from_argv(&self.runtime.start_prefix) {
            Some(prefix) => prefix.arg(self.runtime.docker.clone()),
            None => LaunchCommand::new(self.runtime.docker.clone()),
        };
        base.args(args)
    }

    /// Run a short docker command, bounded by `limit`.
    async fn probe(&self, args: &[&str], limit: Duration) -> anyhow::Result<Output> {
        let command = self.docker(args.iter().copied());
        debug!(command = %command, "running runtime probe");

        let mut cmd = command.to_command();
        match timeout(limit, cmd.output()).await {
            Ok(output) => output.with_context(|| format!("running `{command}`")),
            Err(_) => Err(anyhow!("`{command}` did not finish within {limit:?}")),
        }
    }

    async fn check_ready(&self) -> bool {
        match self.probe(&["images"], self.runtime.probe_timeout()).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                output.status.success()
                    && !stdout.trim().is_empty()
                    && !stdout.contains("error occurred")
                    && !stderr.contains("error occurred")
            }
            Err(err) => {
                debug!(error = %err, "runtime readiness probe failed");
                false
            }
        }
    }

    /// Whether the processing image is available locally.
    pub async fn image_installed(&self) -> bool {
        match self.probe(&["images"], self.runtime.probe_timeout()).await {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&self.runtime.image),
            Err(err) => {
                warn!(error = %err, "could not list runtime images");
                false
            }
        }
    }

    /// Poll readiness with a bounded number of attempts.
    ///
    /// Cancel by dropping the returned future.
    pub async fn ensure_ready(&self) -> Result<()> {
        let readiness = &self.runtime.readiness;
        let attempts = readiness.max_attempts.max(1);

        for attempt in 1..=attempts {
            if self.check_ready().await {
                info!(attempt, "container runtime is ready");
                return Ok(());
            }
            debug!(attempt, max_attempts = attempts, "container runtime not ready yet");
            if attempt < attempts {
                sleep(readiness.interval()).await;
            }
        }

        Err(DreamError::RuntimeUnavailable(format!(
            "`{}` did not become ready after {attempts} attempts",
            self.runtime.docker
        )))
    }

    async fn remove_container(&self) -> Result<()> {
        let name = self.runtime.container_name.as_str();
        let output = self
            .probe(&["rm", "-f", name], self.runtime.teardown_timeout())
            .await?;

        if output.status.success() {
            info!(container = name, "job container removed");
        } else {
            // Nothing to remove is the common case after a normal exit.
            debug!(
                container = name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "container removal reported failure"
            );
        }
        Ok(())
    }
}

impl ContainerRuntimeGateway for DockerGateway {
    fn launch_command(&self, request: &LaunchRequest<'_>) -> Result<LaunchCommand> {
        let spec = request.spec;
        let mount = format!(
            "{}:{CONTAINER_DATA_DIR}",
            to_runtime_path(request.scratch_dir, self.runtime.path_style)
        );

        let cmd = self.docker([
            "run",
            "--rm",
            "--name",
            self.runtime.container_name.as_str(),
            "-v",
            mount.as_str(),
        ]);

        let cmd = match spec.kind {
            JobKind::DeepDream => cmd
                .args(env_args(&[
                    ("INPUT", request.input_file.to_string()),
                    ("ITER", spec.iterations.to_string()),
                    ("OCTAVE", spec.octave.to_string()),
                    ("INTENSITY", spec.intensity.to_string()),
                    ("SCALE", spec.scale.to_string()),
                    ("MODEL", spec.model.clone()),
                    ("ROTATE", spec.rotation.to_string()),
                ]))
                .arg(self.runtime.image.clone())
                .args(["python", "-u", "/deepdream/deepdream.py"]),
            JobKind::NeuralArt => {
                let style = request.style_file.ok_or_else(|| {
                    DreamError::SpawnFailed("neural art job without a style image".to_string())
                })?;
                cmd.arg(self.runtime.image.clone())
                    .args(["/home/torch/install/bin/qlua", "/neuralart/main.lua"])
                    .arg("--style")
                    .arg(format!("{CONTAINER_DATA_DIR}/{style}"))
                    .args(["--display_interval", "0"])
                    .arg("--output_dir")
                    .arg(format!("{CONTAINER_DATA_DIR}/output"))
                    .arg("--content")
                    .arg(format!("{CONTAINER_DATA_DIR}/{}", request.input_file))
                    .arg("--num_iters")
                    .arg(spec.iterations.to_string())
                    .arg("--size")
                    .arg(spec.max_side_length.unwrap_or(0).to_string())
                    .arg("--cpu")
            }
        };

        Ok(cmd)
    }

    fn runtime_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.check_ready())
    }

    fn teardown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.remove_container())
    }
}

fn env_args(vars: &[(&str, String)]) -> Vec<String> {
    vars.iter()
        .flat_map(|(key, value)| ["-e".to_string(), format!("{key}={value}")])
        .collect()
}

/// Translate a host path into the syntax the runtime expects for volume
/// mounts.
///
/// With [`PathStyle::Toolbox`], `C:\Users\Shared` becomes `//c/Users/Shared`.
pub fn to_runtime_path(path: &Path, style: PathStyle) -> String {
    let raw = path.to_string_lossy();
    match style {
        PathStyle::Native => raw.into_owned(),
        PathStyle::Toolbox => {
            let slashed = raw.replace('\\', "/");
            match slashed.split_once(':') {
                Some((drive, rest)) => {
                    format!("//{}{}", drive.to_lowercase(), rest.replace(':', ""))
                }
                None => format!("//{}", slashed.trim_start_matches('/')),
            }
        }
    }
}
