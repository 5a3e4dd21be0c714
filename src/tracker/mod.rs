//! Login/logout alternation per vehicle.

pub mod state;

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use uuid::Uuid;

use crate::{
    db::{Database, LogTransition, Presence, Vehicle, VehicleLogEntry},
    error::PipelineError,
};

pub use state::{SessionEvent, SightingOutcome, TrackerEvent};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Clone)]
pub struct SessionTracker {
    db: Database,
    image_dir: PathBuf,
}

impl SessionTracker {
    pub fn new(db: Database, image_dir: PathBuf) -> Self {
        Self { db, image_dir }
    }

    /// Applies one sighting of `plate_id` captured at `captured_at`.
    ///
    /// The first sighting of a plate stores `frame` as the vehicle's reference
    /// image. A sighting captured before the vehicle's latest transition is
    /// rejected without writing anything.
    pub async fn record_sighting(
        &self,
        plate_id: i64,
        frame: &DynamicImage,
        captured_at: DateTime<Utc>,
    ) -> Result<SightingOutcome, PipelineError> {
        let existing = self
            .db
            .find_vehicle_by_plate(plate_id)
            .await
            .map_err(PipelineError::Storage)?;

        let written_image = match existing {
            Some(_) => None,
            None => Some(self.save_reference_image(frame).await?),
        };
        let image_arg = written_image
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());

        let applied = match self.db.apply_sighting(plate_id, image_arg, captured_at).await {
            Ok(applied) => applied,
            Err(err) => {
                if let Some(path) = &written_image {
                    discard_image(path).await;
                }
                return Err(PipelineError::Storage(err));
            }
        };

        // Another sighting created the vehicle between the lookup and the transaction.
        if let Some(path) = &written_image {
            if !applied.vehicle_created {
                discard_image(path).await;
            }
        }

        let event = match applied.transition {
            LogTransition::LoggedIn(entry) => {
                log_info!("vehicle {} logged in (log {})", applied.vehicle.id, entry.id);
                SessionEvent::LoggedIn { entry }
            }
            LogTransition::LoggedOut(entry) => {
                let duration = entry.last_transition_at() - entry.check_in;
                log_info!(
                    "vehicle {} logged out after {}s (log {})",
                    applied.vehicle.id,
                    duration.num_seconds(),
                    entry.id
                );
                SessionEvent::LoggedOut { entry, duration }
            }
            LogTransition::Stale { latest } => {
                log_warn!(
                    "dropping stale sighting of vehicle {} captured at {}",
                    applied.vehicle.id,
                    captured_at
                );
                return Err(PipelineError::StaleSighting {
                    vehicle_id: applied.vehicle.id,
                    captured_at,
                    latest: latest.last_transition_at(),
                });
            }
        };

        Ok(SightingOutcome {
            vehicle: applied.vehicle,
            vehicle_created: applied.vehicle_created,
            event,
        })
    }

    pub async fn vehicle_for_plate(&self, plate_id: i64) -> Result<Option<Vehicle>, PipelineError> {
        self.db
            .find_vehicle_by_plate(plate_id)
            .await
            .map_err(PipelineError::Storage)
    }

    pub async fn presence(&self, vehicle_id: i64) -> Result<Presence, PipelineError> {
        self.db
            .vehicle_presence(vehicle_id)
            .await
            .map_err(PipelineError::Storage)
    }

    pub async fn entries(&self, vehicle_id: i64) -> Result<Vec<VehicleLogEntry>, PipelineError> {
        self.db
            .log_entries(vehicle_id)
            .await
            .map_err(PipelineError::Storage)
    }

    async fn save_reference_image(&self, frame: &DynamicImage) -> Result<PathBuf, PipelineError> {
        let path = self.image_dir.join(format!("{}.jpg", Uuid::new_v4()));
        let dir = self.image_dir.clone();
        let rgb = frame.to_rgb8();
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create image directory {}", dir.display()))?;
            rgb.save(&target)
                .with_context(|| format!("failed to write reference image {}", target.display()))?;
            Ok(())
        })
        .await
        .context("reference image writer join failed")
        .and_then(|result| result)
        .map_err(PipelineError::Image)?;

        Ok(path)
    }
}

async fn discard_image(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        log_warn!("failed to remove unused image {}: {err}", path.display());
    }
}
