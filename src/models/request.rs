use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{GenerationError, Result};

/// Model names offered before the remote catalogue has been fetched.
pub const BUILTIN_MODELS: &[&str] = &[
    "flux-pro",
    "stable-diffusion",
    "vqgan-clip",
    "midjourney",
    "animegan",
    "pixel-art",
    "watercolor",
    "oil-painting",
];

pub const MIN_DIMENSION: u32 = 256;
pub const MAX_DIMENSION: u32 = 4096;
pub const MAX_REPETITIONS: u32 = 50;

/// Everything one batch run needs. Immutable once handed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub models: Vec<String>,
    pub repetitions: u32,
    pub output_dir: PathBuf,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 1024,
            height: 1024,
            models: Vec::new(),
            repetitions: 1,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_preset(self, preset: SizePreset) -> Self {
        match preset.dimensions() {
            Some((width, height)) => self.with_size(width, height),
            None => self,
        }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// `models × repetitions`. Zero means the run is a no-op.
    pub fn total_attempts(&self) -> usize {
        self.models.len() * self.repetitions as usize
    }

    /// Work items in execution order: models outer, attempt index inner.
    pub fn work_items(&self) -> impl Iterator<Item = WorkItem<'_>> + '_ {
        self.models.iter().flat_map(move |model| {
            (1..=self.repetitions).map(move |attempt| WorkItem {
                model: model.as_str(),
                attempt,
            })
        })
    }

    /// Checks a caller runs before starting a worker. The worker itself
    /// never validates.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::Config("Prompt cannot be empty".into()));
        }
        if self.models.is_empty() {
            return Err(GenerationError::Config(
                "Select at least one model".into(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(GenerationError::Config(
                "Choose an output directory".into(),
            ));
        }
        if let Some(model) = self.models.iter().find(|m| m.trim().is_empty()) {
            return Err(GenerationError::Config(format!(
                "Invalid model name: {:?}",
                model
            )));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(GenerationError::Config(format!(
                    "{} must be between {} and {} px, got {}",
                    name, MIN_DIMENSION, MAX_DIMENSION, value
                )));
            }
        }
        if !(1..=MAX_REPETITIONS).contains(&self.repetitions) {
            return Err(GenerationError::Config(format!(
                "Repetitions must be between 1 and {}, got {}",
                MAX_REPETITIONS, self.repetitions
            )));
        }
        Ok(())
    }
}

/// One (model, attempt index) unit of work. Attempt indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem<'a> {
    pub model: &'a str,
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePreset {
    Custom,
    FullHd,
    Qhd,
    Uhd4k,
    Square1k,
    Square2k,
    PortraitFullHd,
    Portrait2k,
    Portrait4k,
}

impl SizePreset {
    pub const ALL: [SizePreset; 9] = [
        SizePreset::Custom,
        SizePreset::FullHd,
        SizePreset::Qhd,
        SizePreset::Uhd4k,
        SizePreset::Square1k,
        SizePreset::Square2k,
        SizePreset::PortraitFullHd,
        SizePreset::Portrait2k,
        SizePreset::Portrait4k,
    ];

    /// `None` for `Custom`: the caller supplies width and height.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            SizePreset::Custom => None,
            SizePreset::FullHd => Some((1920, 1080)),
            SizePreset::Qhd => Some((2560, 1440)),
            SizePreset::Uhd4k => Some((3840, 2160)),
            SizePreset::Square1k => Some((1024, 1024)),
            SizePreset::Square2k => Some((2048, 2048)),
            SizePreset::PortraitFullHd => Some((1080, 1920)),
            SizePreset::Portrait2k => Some((1440, 2560)),
            SizePreset::Portrait4k => Some((2160, 3840)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SizePreset::Custom => "Custom",
            SizePreset::FullHd => "Full HD (1920×1080)",
            SizePreset::Qhd => "2K (2560×1440)",
            SizePreset::Uhd4k => "4K (3840×2160)",
            SizePreset::Square1k => "Square 1K (1024×1024)",
            SizePreset::Square2k => "Square 2K (2048×2048)",
            SizePreset::PortraitFullHd => "Phone Full HD (1080×1920)",
            SizePreset::Portrait2k => "Phone 2K (1440×2560)",
            SizePreset::Portrait4k => "Phone 4K (2160×3840)",
        }
    }
}
