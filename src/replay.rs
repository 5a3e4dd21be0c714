//! Offline runs over recorded detector and OCR output.
//!
//! A manifest lists frames on disk together with what the detector and OCR
//! produced for them, so the whole pipeline (quality gate, normalization,
//! storage) can be driven without the models loaded.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};

use crate::{
    capabilities::{Collaborators, Detector, Enhancer, OcrEngine, PlateBox, RawToken},
    pipeline::{Frame, FrameSource},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedPlate {
    #[serde(flatten)]
    pub detection: PlateBox,
    #[serde(default)]
    pub lines: Vec<RawToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Relative paths resolve against the manifest's directory.
    pub image: PathBuf,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub detections: Vec<RecordedPlate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub frames: Vec<RecordedFrame>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest: Manifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;

        if let Some(base) = path.parent() {
            for frame in &mut manifest.frames {
                if frame.image.is_relative() {
                    frame.image = base.join(&frame.image);
                }
            }
        }
        Ok(manifest)
    }
}

#[derive(Default)]
struct Staged {
    detections: Vec<PlateBox>,
    lines: VecDeque<Vec<RawToken>>,
}

/// Plays back the recorded detector and OCR output of the current frame.
///
/// OCR answers are handed out in detection order, one per plate-labelled box.
#[derive(Clone, Default)]
pub struct ReplayModels {
    staged: Arc<Mutex<Staged>>,
    plate_label: String,
}

impl ReplayModels {
    pub fn new(plate_label: impl Into<String>) -> Self {
        Self {
            staged: Arc::default(),
            plate_label: plate_label.into(),
        }
    }

    pub fn stage(&self, frame: &RecordedFrame) {
        let mut staged = self.lock();
        staged.detections = frame.detections.iter().map(|d| d.detection.clone()).collect();
        staged.lines = frame
            .detections
            .iter()
            .filter(|d| d.detection.label == self.plate_label)
            .map(|d| d.lines.clone())
            .collect();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Staged> {
        match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Detector for ReplayModels {
    fn locate_plates(&self, _image: &DynamicImage) -> Result<Vec<PlateBox>> {
        Ok(self.lock().detections.clone())
    }
}

impl OcrEngine for ReplayModels {
    fn read(&self, _region: &DynamicImage) -> Result<Vec<RawToken>> {
        Ok(self.lock().lines.pop_front().unwrap_or_default())
    }
}

/// Plain Lanczos upscaling, standing in for a learned super-resolution model.
pub struct ResampleEnhancer;

impl Enhancer for ResampleEnhancer {
    fn upscale(&self, region: &DynamicImage, factor: u32) -> Result<DynamicImage> {
        let factor = factor.max(1);
        Ok(region.resize_exact(
            region.width() * factor,
            region.height() * factor,
            FilterType::Lanczos3,
        ))
    }
}

pub fn replay_collaborators(models: &ReplayModels) -> Collaborators {
    let shared = Arc::new(models.clone());
    Collaborators::new(shared.clone(), Arc::new(ResampleEnhancer), shared)
}

/// Feeds manifest frames in order, staging each one's recordings as it is read.
pub struct ManifestSource {
    name: String,
    frames: VecDeque<RecordedFrame>,
    models: ReplayModels,
}

impl ManifestSource {
    pub fn new(name: impl Into<String>, manifest: Manifest, models: ReplayModels) -> Self {
        Self {
            name: name.into(),
            frames: manifest.frames.into(),
            models,
        }
    }
}

impl FrameSource for ManifestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(recorded) = self.frames.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&recorded.image)
            .with_context(|| format!("failed to load frame {}", recorded.image.display()))?;
        self.models.stage(&recorded);
        Ok(Some(Frame {
            image,
            captured_at: recorded.captured_at.unwrap_or_else(Utc::now),
        }))
    }
}
