// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::types::JobSpec;

/// Command-line arguments for `dreamrunner`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dreamrunner",
    version,
    about = "Run deep dream and neural art jobs inside a container runtime.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file means built-in defaults.
    #[arg(long, global = true, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DREAMRUNNER_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate config and inputs, print the launch command, run nothing.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Apply deep dream to an image.
    DeepDream(DeepDreamArgs),
    /// Transfer the style of one image onto another.
    NeuralArt(NeuralArtArgs),
    /// Check that the container runtime responds and the image is present.
    Check,
}

#[derive(Debug, Clone, Args)]
pub struct DeepDreamArgs {
    /// Input image.
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,

    /// Network layer to amplify.
    #[arg(long, default_value = "inception_4c/output")]
    pub model: String,

    #[arg(long, default_value_t = 10)]
    pub iterations: u32,

    #[arg(long, default_value_t = 4)]
    pub octave: u32,

    #[arg(long, default_value_t = 1.0)]
    pub intensity: f64,

    /// Normalized zoom between octaves (0 disables zoom).
    #[arg(long, default_value_t = 0.0)]
    pub scale: f64,

    /// Rotation per octave, in degrees.
    #[arg(long, default_value_t = 0.0)]
    pub rotation: f64,
}

#[derive(Debug, Clone, Args)]
pub struct NeuralArtArgs {
    /// Content image.
    #[arg(value_name = "IMAGE")]
    pub input: PathBuf,

    /// Style image.
    #[arg(value_name = "STYLE")]
    pub style: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub iterations: u32,

    #[arg(long, value_name = "PX")]
    pub max_side_length: Option<u32>,
}

impl DeepDreamArgs {
    pub fn to_spec(&self, input_image: Vec<u8>) -> JobSpec {
        JobSpec::deep_dream(input_image, self.model.clone())
            .with_iterations(self.iterations)
            .with_octave(self.octave)
            .with_intensity(self.intensity)
            .with_scale(self.scale)
            .with_rotation(self.rotation)
    }
}

impl NeuralArtArgs {
    pub fn to_spec(&self, input_image: Vec<u8>, style_image: Vec<u8>) -> JobSpec {
        JobSpec::neural_art(input_image, style_image)
            .with_iterations(self.iterations)
            .with_max_side_length(self.max_side_length)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;

    #[test]
    fn parses_deep_dream_with_options() {
        let args = CliArgs::try_parse_from([
            "dreamrunner",
            "deep-dream",
            "cat.jpg",
            "--iterations",
            "3",
            "--rotation",
            "2.5",
        ])
        .unwrap();

        let Command::DeepDream(dd) = &args.command else {
            panic!("expected deep-dream, got {:?}", args.command);
        };
        assert_eq!(dd.input, PathBuf::from("cat.jpg"));

        let spec = dd.to_spec(vec![1, 2]);
        assert_eq!(spec.kind, JobKind::DeepDream);
        assert_eq!(spec.iterations, 3);
        assert_eq!(spec.rotation, 2.5);
        assert!(spec.style_image.is_none());
    }

    #[test]
    fn neural_art_requires_style() {
        assert!(CliArgs::try_parse_from(["dreamrunner", "neural-art", "a.jpg"]).is_err());

        let args =
            CliArgs::try_parse_from(["dreamrunner", "--dry-run", "neural-art", "a.jpg", "b.jpg"])
                .unwrap();
        assert!(args.dry_run);
        let Command::NeuralArt(na) = &args.command else {
            panic!("expected neural-art, got {:?}", args.command);
        };
        assert_eq!(na.to_spec(vec![1], vec![2]).kind, JobKind::NeuralArt);
    }

    #[test]
    fn size_limit_is_neural_art_only() {
        assert!(
            CliArgs::try_parse_from(["dreamrunner", "deep-dream", "a.jpg", "--max-side-length", "512"])
                .is_err()
        );

        let args = CliArgs::try_parse_from([
            "dreamrunner",
            "neural-art",
            "a.jpg",
            "b.jpg",
            "--max-side-length",
            "512",
        ])
        .unwrap();
        assert_eq!(args.config, default_config_path());
        let Command::NeuralArt(na) = &args.command else {
            panic!("expected neural-art, got {:?}", args.command);
        };
        assert_eq!(na.to_spec(vec![1], vec![2]).max_side_length, Some(512));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "dreamrunner",
            "check",
            "--config",
            "other.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("other.toml"));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(matches!(args.command, Command::Check));
    }
}
