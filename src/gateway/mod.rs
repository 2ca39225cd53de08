// src/gateway/mod.rs

//! Container runtime collaborator.
//!
//! The supervisor never builds runtime commands itself. It asks a
//! [`ContainerRuntimeGateway`] for:
//! - the launch command of a job ([`LaunchCommand`]),
//! - whether the runtime is ready to accept a job,
//! - tearing down the runtime-level container after a kill.
//!
//! [`DockerGateway`] is the production implementation; tests plug in a
//! gateway that launches plain shell scripts.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;

use crate::errors::Result;
use crate::types::JobSpec;

pub mod docker;

pub use docker::{DockerGateway, to_runtime_path};

/// Boxed future returned by gateway methods, keeping the trait object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a gateway needs to build the launch command of one job.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub spec: &'a JobSpec,
    /// Host scratch directory, mounted into the container.
    pub scratch_dir: &'a Path,
    /// File name (not path) of the persisted input image.
    pub input_file: &'a str,
    /// File name of the persisted style image, if any.
    pub style_file: Option<&'a str>,
}

/// Opaque argv executed by the supervisor without interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a non-empty argv into a command. Returns `None` for an empty
    /// slice.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone()).args(rest.iter().cloned()))
    }

    /// Tokio command with piped stdout/stderr, killed when dropped.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Trait abstracting the container runtime.
pub trait ContainerRuntimeGateway: Send + Sync {
    /// Build the command that runs `request` inside the runtime.
    fn launch_command(&self, request: &LaunchRequest<'_>) -> Result<LaunchCommand>;

    /// Single, bounded readiness check.
    fn runtime_ready(&self) -> BoxFuture<'_, bool>;

    /// Stop and remove the runtime-level job container. Resolves once the
    /// teardown finished or gave up.
    fn teardown(&self) -> BoxFuture<'_, Result<()>>;
}
