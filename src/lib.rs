// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod fs;
pub mod gateway;
pub mod logging;
pub mod protocol;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_or_default;
use crate::config::model::ConfigFile;
use crate::events::{Event, EventBus, JobOutcome, LogSubscriber};
use crate::exec::JobSupervisor;
use crate::fs::ResourceRole;
use crate::gateway::{ContainerRuntimeGateway, DockerGateway, LaunchRequest};
use crate::types::{JobId, JobSpec};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - runtime readiness
/// - the job supervisor and its event bus
/// - Ctrl-C handling (kills the running job)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_or_default(&args.config)?;
    let gateway = DockerGateway::from_config(&cfg);

    let spec = match &args.command {
        Command::Check => return check_runtime(&gateway).await,
        Command::DeepDream(dd) => dd.to_spec(read_image(&dd.input)?),
        Command::NeuralArt(na) => na.to_spec(read_image(&na.input)?, read_image(&na.style)?),
    };

    if args.dry_run {
        print_dry_run(&cfg, &gateway, &spec)?;
        return Ok(());
    }

    gateway.ensure_ready().await?;
    if !gateway.image_installed().await {
        warn!(
            image = %cfg.runtime.image,
            "processing image not found locally; the runtime will try to pull it"
        );
    }

    let bus = EventBus::new();
    bus.subscribe(Arc::new(LogSubscriber));
    let (_sub, mut events) = bus.subscribe_channel();

    let supervisor = JobSupervisor::from_config(&cfg, bus)?;
    let job = supervisor.start(spec).await?;

    // Ctrl-C → kill the job; its ProcessDone still arrives below.
    let ctrl_c = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; killing job");
            supervisor.kill().await;
        })
    };

    let outcome = loop {
        match events.recv().await {
            Some(Event::ImageSaved(path)) => println!("{}", path.display()),
            Some(Event::ProcessDone(outcome)) => break outcome,
            Some(_) => {}
            None => bail!("event bus closed before {job} finished"),
        }
    };
    ctrl_c.abort();

    match outcome {
        JobOutcome::Success => Ok(()),
        JobOutcome::Cancelled => bail!("{job} was cancelled"),
        JobOutcome::Failed(class) => {
            let diagnostics = supervisor.last_diagnostics();
            if !diagnostics.is_empty() {
                eprintln!("last output of {job}:");
                for line in diagnostics {
                    eprintln!("  {line}");
                }
            }
            bail!("{job} failed: {}", class.describe())
        }
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image {} is empty", path.display());
    }
    Ok(bytes)
}

async fn check_runtime(gateway: &DockerGateway) -> Result<()> {
    let runtime = gateway.runtime();
    println!("dreamrunner check");
    println!("  runtime: {}", runtime.docker);

    gateway.ensure_ready().await?;
    println!("  runtime ready: yes");

    let installed = gateway.image_installed().await;
    println!(
        "  image {}: {}",
        runtime.image,
        if installed { "installed" } else { "missing" }
    );
    if !installed {
        bail!("processing image `{}` is not installed", runtime.image);
    }
    Ok(())
}

/// Print the resolved configuration and the command a job would run.
fn print_dry_run(cfg: &ConfigFile, gateway: &DockerGateway, spec: &JobSpec) -> Result<()> {
    let job = JobId(1);
    let input_file = format!("dream-{}-{}-XXXXXX.jpg", job.0, ResourceRole::Input);
    let style_file = spec
        .style_image
        .as_ref()
        .map(|_| format!("dream-{}-{}-XXXXXX.jpg", job.0, ResourceRole::Style));
    let scratch_dir = cfg.scratch_dir();

    let command = gateway.launch_command(&LaunchRequest {
        spec,
        scratch_dir: &scratch_dir,
        input_file: &input_file,
        style_file: style_file.as_deref(),
    })?;

    println!("dreamrunner dry-run");
    println!("  scratch.dir = {}", scratch_dir.display());
    println!("  runtime.docker = {}", cfg.runtime.docker);
    println!("  runtime.image = {}", cfg.runtime.image);
    println!("  runtime.container_name = {}", cfg.runtime.container_name);
    if !cfg.runtime.start_prefix.is_empty() {
        println!("  runtime.start_prefix = {:?}", cfg.runtime.start_prefix);
    }
    println!("  runtime.path_style = {:?}", cfg.runtime.path_style);
    println!();
    println!("job: {spec:?}");
    println!("command: {command}");

    debug!("dry-run complete (no execution)");
    Ok(())
}
