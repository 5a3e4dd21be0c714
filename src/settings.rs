use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::quality::QualityThresholds;
use crate::text::{CharTable, WatermarkConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameGateSettings {
    pub enabled: bool,
    /// Hamming distance at or above which a frame counts as changed.
    pub change_threshold: u32,
    /// An unchanged frame is processed again once this much time has passed.
    pub cooldown_secs: u64,
}

impl Default for FrameGateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            change_threshold: 8,
            cooldown_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Reference images of newly seen vehicles land here.
    pub image_dir: PathBuf,
    /// Detector class that marks a plate region.
    pub plate_label: String,
    pub crop_margin: u32,
    pub max_frame_width: u32,
    pub max_frame_height: u32,
    pub upscale_factor: u32,
    pub collaborator_timeout_ms: u64,
    pub quality: QualityThresholds,
    pub watermark: WatermarkConfig,
    pub translations: CharTable,
    pub frame_gate: FrameGateSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("platewatch.sqlite3"),
            image_dir: PathBuf::from("images"),
            plate_label: "License Plate".into(),
            crop_margin: 10,
            max_frame_width: 1600,
            max_frame_height: 1200,
            upscale_factor: 4,
            collaborator_timeout_ms: 10_000,
            quality: QualityThresholds::default(),
            watermark: WatermarkConfig::default(),
            translations: CharTable::default(),
            frame_gate: FrameGateSettings::default(),
        }
    }
}

impl Settings {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings from `path`; a missing or unreadable file yields defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(
                        "Ignoring malformed settings in {}: {err}; using defaults",
                        path.display()
                    );
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
