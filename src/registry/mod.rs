//! Signature to plate identity.

use crate::{
    db::{Database, Plate, PlateResolution},
    error::PipelineError,
    text::PlateSignature,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

#[derive(Clone)]
pub struct PlateRegistry {
    db: Database,
}

impl PlateRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Idempotent get-or-create. Never invents an id when storage fails.
    pub async fn resolve(&self, signature: &PlateSignature) -> Result<PlateResolution, PipelineError> {
        let resolution = self
            .db
            .get_or_create_plate(signature)
            .await
            .map_err(PipelineError::Storage)?;

        if resolution.created {
            log_info!(
                "registered plate {} as id {}",
                signature.display(),
                resolution.plate.id
            );
        }
        Ok(resolution)
    }

    pub async fn find(&self, signature: &PlateSignature) -> Result<Option<Plate>, PipelineError> {
        self.db
            .find_plate(signature)
            .await
            .map_err(PipelineError::Storage)
    }

    pub async fn count(&self) -> Result<u64, PipelineError> {
        self.db.count_plates().await.map_err(PipelineError::Storage)
    }
}
