use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::pipeline::detector::DetectorOptions;

/// Preset combinations of face count and audio reactivity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// One face, no microphone.
    Single,
    /// Up to three faces, no microphone.
    Multi,
    /// Up to three faces driven by the microphone.
    #[default]
    Reactive,
}

impl Variant {
    pub fn max_faces(&self) -> usize {
        match self {
            Variant::Single => 1,
            Variant::Multi | Variant::Reactive => 3,
        }
    }

    pub fn uses_audio(&self) -> bool {
        matches!(self, Variant::Reactive)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Variant::Single => "single",
            Variant::Multi => "multi",
            Variant::Reactive => "reactive",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "face-cells", version, about = "Face-tracked meshes over a webcam feed")]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = Variant::Reactive, env = "FACE_CELLS_VARIANT")]
    pub variant: Variant,

    /// Overrides the variant's face limit.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub max_faces: Option<u8>,

    /// Never open the microphone, even for the reactive variant.
    #[arg(long)]
    pub no_audio: bool,

    #[arg(long, default_value_t = 0)]
    pub camera_index: u32,

    #[arg(long, default_value = "models", env = "FACE_CELLS_MODELS_DIR")]
    pub models_dir: PathBuf,

    /// Where to fetch the face detector model when it is not on disk.
    #[arg(long, env = "FACE_CELLS_DETECTOR_URL")]
    pub detector_model_url: Option<String>,

    /// Where to fetch the face landmark model when it is not on disk.
    #[arg(long, env = "FACE_CELLS_LANDMARK_URL")]
    pub landmark_model_url: Option<String>,

    /// Seed for shape picks, jitter and mutations.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub variant: Variant,
    pub detector: DetectorOptions,
    pub audio: bool,
    pub camera_index: u32,
    pub models_dir: PathBuf,
    pub detector_model_url: Option<String>,
    pub landmark_model_url: Option<String>,
    pub seed: Option<u64>,
}

impl AppConfig {
    pub fn from_cli(cli: Cli) -> Self {
        let max_faces = cli
            .max_faces
            .map(usize::from)
            .unwrap_or_else(|| cli.variant.max_faces());

        Self {
            variant: cli.variant,
            detector: DetectorOptions {
                max_faces,
                ..DetectorOptions::default()
            },
            audio: cli.variant.uses_audio() && !cli.no_audio,
            camera_index: cli.camera_index,
            models_dir: cli.models_dir,
            detector_model_url: cli.detector_model_url.filter(|url| !url.trim().is_empty()),
            landmark_model_url: cli.landmark_model_url.filter(|url| !url.trim().is_empty()),
            seed: cli.seed,
        }
    }
}
