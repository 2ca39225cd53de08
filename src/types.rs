// src/types.rs

//! Plain data types shared across the engine: what a job looks like, how it
//! is identified and which lifecycle phase it is in.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which processing pipeline the runtime container executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// DeepDream: a single input image amplified by a trained model layer.
    DeepDream,
    /// Neural style transfer: input image rendered in the style of a second image.
    NeuralArt,
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepdream" | "deep-dream" => Ok(JobKind::DeepDream),
            "neuralart" | "neural-art" => Ok(JobKind::NeuralArt),
            other => Err(format!(
                "invalid job kind: {other} (expected \"deep-dream\" or \"neural-art\")"
            )),
        }
    }
}

/// Immutable input to a single run.
///
/// Images are carried as encoded bytes; the supervisor persists them into the
/// scratch directory right before the process is launched.
#[derive(Clone, PartialEq)]
pub struct JobSpec {
    pub kind: JobKind,
    pub input_image: Vec<u8>,
    pub style_image: Option<Vec<u8>>,
    pub iterations: u32,
    pub intensity: f64,
    pub octave: u32,
    /// Normalized scale factor (`1 - 100 / scale_percent`).
    pub scale: f64,
    /// Rotation in degrees.
    pub rotation: f64,
    pub model: String,
    /// Long edge limit for neural art. `None` keeps the original size.
    pub max_side_length: Option<u32>,
}

impl JobSpec {
    pub fn deep_dream(input_image: impl Into<Vec<u8>>, model: impl Into<String>) -> Self {
        Self {
            kind: JobKind::DeepDream,
            input_image: input_image.into(),
            style_image: None,
            iterations: 10,
            intensity: 1.0,
            octave: 4,
            scale: 0.0,
            rotation: 0.0,
            model: model.into(),
            max_side_length: None,
        }
    }

    pub fn neural_art(input_image: impl Into<Vec<u8>>, style_image: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: JobKind::NeuralArt,
            input_image: input_image.into(),
            style_image: Some(style_image.into()),
            iterations: 100,
            intensity: 1.0,
            octave: 0,
            scale: 0.0,
            rotation: 0.0,
            model: String::new(),
            max_side_length: None,
        }
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_octave(mut self, octave: u32) -> Self {
        self.octave = octave;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_max_side_length(mut self, max_side_length: Option<u32>) -> Self {
        self.max_side_length = max_side_length;
        self
    }
}

// Image bytes are noise in logs; print their sizes instead.
impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("kind", &self.kind)
            .field("input_image_bytes", &self.input_image.len())
            .field("style_image_bytes", &self.style_image.as_ref().map(Vec::len))
            .field("iterations", &self.iterations)
            .field("intensity", &self.intensity)
            .field("octave", &self.octave)
            .field("scale", &self.scale)
            .field("rotation", &self.rotation)
            .field("model", &self.model)
            .field("max_side_length", &self.max_side_length)
            .finish()
    }
}

/// Generation number of a run. Every `start` allocates a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle phase of the most recent job handle.
///
/// ```text
/// Idle --start--> Preparing --spawned--> Running --exit/kill--> Completed | Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Failed | JobPhase::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, JobPhase::Preparing | JobPhase::Running)
    }
}
