//! One frame in, plate readings out.

pub mod frame_gate;
pub mod source;

use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage};
use tokio::time::Instant;

use crate::{
    capabilities::{BoundingBox, Collaborators, PlateBox, RawToken},
    db::{AccessLog, Database},
    error::{PipelineError, StartupError},
    quality,
    registry::PlateRegistry,
    settings::Settings,
    text::{canonicalize, PlateSignature, TextNormalizer, Watermark},
    tracker::{SessionTracker, SightingOutcome},
};

pub use frame_gate::FrameGate;
pub use source::{Frame, FrameSource, SourceController, SourceStats};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Persists readings: plate registry, session tracker and access log.
#[derive(Clone)]
pub struct StoreSink {
    db: Database,
    registry: PlateRegistry,
    tracker: SessionTracker,
}

impl StoreSink {
    pub fn new(db: Database, image_dir: PathBuf) -> Self {
        Self {
            registry: PlateRegistry::new(db.clone()),
            tracker: SessionTracker::new(db.clone(), image_dir),
            db,
        }
    }

    pub fn registry(&self) -> &PlateRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    async fn audit(&self, plate_text: String, recognized: bool, message: &str) {
        let entry = AccessLog {
            id: None,
            plate_text,
            recognized,
            message: message.to_string(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.db.insert_access_log(&entry).await {
            log_warn!("failed to write access log: {err:#}");
        }
    }
}

/// Where canonical plates go.
#[derive(Clone)]
pub enum Sink {
    /// Only log the display text.
    Display,
    Store(StoreSink),
}

#[derive(Debug)]
pub enum PlateOutcome {
    /// OCR produced nothing that survived normalization.
    NoText,
    /// Shown through the display sink.
    Displayed,
    /// Another box in the same frame already produced this signature.
    Duplicate,
    Stored {
        plate_id: i64,
        plate_created: bool,
        sighting: SightingOutcome,
    },
    /// This plate was abandoned; the rest of the frame was still processed.
    Failed(PipelineError),
}

#[derive(Debug)]
pub struct PlateReading {
    pub bbox: BoundingBox,
    pub enhanced: bool,
    pub signature: Option<PlateSignature>,
    pub outcome: PlateOutcome,
}

impl PlateReading {
    pub fn display_text(&self) -> Option<String> {
        self.signature.as_ref().map(PlateSignature::display)
    }
}

pub struct Pipeline {
    collaborators: Collaborators,
    sink: Sink,
    normalizer: TextNormalizer,
    settings: Settings,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, sink: Sink, settings: Settings) -> Result<Self, StartupError> {
        let watermark = Watermark::new(&settings.watermark).map_err(StartupError::Settings)?;
        let normalizer = TextNormalizer::new(watermark, settings.translations.clone());
        Ok(Self {
            collaborators,
            sink,
            normalizer,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Detects, reads and records every plate in `frame`.
    ///
    /// Fails only when the detector itself fails; problems with a single
    /// plate are reported in that plate's reading.
    pub async fn process_frame(
        &self,
        frame: &DynamicImage,
        captured_at: DateTime<Utc>,
    ) -> Result<Vec<PlateReading>, PipelineError> {
        let started = Instant::now();
        let frame = Arc::new(self.fit_frame(frame));
        let timeout = self.settings.collaborator_timeout();

        let boxes = {
            let detector = Arc::clone(&self.collaborators.detector);
            let image = Arc::clone(&frame);
            call_blocking("detector", timeout, move || detector.locate_plates(&image)).await?
        };

        let plates: Vec<PlateBox> = boxes
            .into_iter()
            .filter(|b| b.label == self.settings.plate_label)
            .collect();
        log_debug!("detector returned {} plate region(s)", plates.len());

        // Overlapping boxes on one plate must count as a single sighting.
        let mut seen = HashSet::new();
        let mut readings = Vec::with_capacity(plates.len());
        for plate in plates {
            let reading = self
                .process_plate(&frame, plate.bbox, captured_at, &mut seen)
                .await;
            if let PlateOutcome::Failed(err) = &reading.outcome {
                log_error!("plate at {:?} failed: {err}", plate.bbox);
            }
            readings.push(reading);
        }

        log_debug!(
            "frame processed in {}ms ({} plate(s))",
            started.elapsed().as_millis(),
            readings.len()
        );
        Ok(readings)
    }

    async fn process_plate(
        &self,
        frame: &Arc<DynamicImage>,
        bbox: BoundingBox,
        captured_at: DateTime<Utc>,
        seen: &mut HashSet<PlateSignature>,
    ) -> PlateReading {
        let mut reading = PlateReading {
            bbox,
            enhanced: false,
            signature: None,
            outcome: PlateOutcome::NoText,
        };

        let tokens = match self.read_plate(frame, bbox, &mut reading.enhanced).await {
            Ok(tokens) => tokens,
            Err(err) => {
                reading.outcome = PlateOutcome::Failed(err);
                return reading;
            }
        };

        let text = self.normalizer.normalize(&tokens);
        let Some(signature) = canonicalize(&text, self.normalizer.watermark()) else {
            log_info!("no readable plate text in {} OCR line(s)", tokens.len());
            if let Sink::Store(store) = &self.sink {
                store.audit(String::new(), false, "No readable text").await;
            }
            return reading;
        };

        if !seen.insert(signature.clone()) {
            log_debug!("plate {} already read in this frame", signature.display());
            reading.outcome = PlateOutcome::Duplicate;
            reading.signature = Some(signature);
            return reading;
        }

        reading.outcome = match &self.sink {
            Sink::Display => {
                log_info!("detected plate: {}", signature.display());
                PlateOutcome::Displayed
            }
            Sink::Store(store) => match self.store(store, &signature, frame, captured_at).await {
                Ok(outcome) => outcome,
                Err(err) => PlateOutcome::Failed(err),
            },
        };
        reading.signature = Some(signature);
        reading
    }

    async fn read_plate(
        &self,
        frame: &Arc<DynamicImage>,
        bbox: BoundingBox,
        enhanced: &mut bool,
    ) -> Result<Vec<RawToken>, PipelineError> {
        let (x, y, width, height) = bbox
            .crop_rect(self.settings.crop_margin, frame.width(), frame.height())
            .ok_or_else(|| {
                PipelineError::Image(anyhow::anyhow!("plate box {bbox:?} lies outside the frame"))
            })?;
        let mut region = Arc::new(frame.crop_imm(x, y, width, height));
        let timeout = self.settings.collaborator_timeout();

        let report = quality::measure(&region);
        if report.needs_enhancement(&self.settings.quality) {
            log_debug!(
                "enhancing plate crop (contrast {:.1}, sharpness {:.1})",
                report.contrast,
                report.sharpness
            );
            let enhancer = Arc::clone(&self.collaborators.enhancer);
            let input = Arc::clone(&region);
            let factor = self.settings.upscale_factor;
            region = Arc::new(
                call_blocking("enhancer", timeout, move || enhancer.upscale(&input, factor)).await?,
            );
            *enhanced = true;
        }

        let ocr = Arc::clone(&self.collaborators.ocr);
        call_blocking("ocr", timeout, move || ocr.read(&region)).await
    }

    async fn store(
        &self,
        store: &StoreSink,
        signature: &PlateSignature,
        frame: &DynamicImage,
        captured_at: DateTime<Utc>,
    ) -> Result<PlateOutcome, PipelineError> {
        let resolution = store.registry.resolve(signature).await?;

        let sighting = match store
            .tracker
            .record_sighting(resolution.plate.id, frame, captured_at)
            .await
        {
            Ok(sighting) => sighting,
            Err(err @ PipelineError::StaleSighting { .. }) => {
                store
                    .audit(signature.display(), true, "Sighting out of capture order")
                    .await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        log_info!(
            "plate {} (id {}): {}",
            signature.display(),
            resolution.plate.id,
            sighting.event.message()
        );
        store
            .audit(signature.display(), true, sighting.event.message())
            .await;

        Ok(PlateOutcome::Stored {
            plate_id: resolution.plate.id,
            plate_created: resolution.created,
            sighting,
        })
    }

    /// Scales frames larger than the configured bounds down, keeping aspect.
    fn fit_frame(&self, frame: &DynamicImage) -> DynamicImage {
        let (max_w, max_h) = (self.settings.max_frame_width, self.settings.max_frame_height);
        if max_w == 0 || max_h == 0 || (frame.width() <= max_w && frame.height() <= max_h) {
            return frame.clone();
        }
        log_debug!(
            "resizing {}x{} frame to fit {}x{}",
            frame.width(),
            frame.height(),
            max_w,
            max_h
        );
        frame.resize(max_w, max_h, FilterType::Triangle)
    }
}

/// Runs a blocking collaborator call on the blocking pool under `timeout`.
///
/// A call that times out keeps running on its thread; its result is dropped.
async fn call_blocking<T, F>(
    stage: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, PipelineError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(call)).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(source))) => Err(PipelineError::Collaborator { stage, source }),
        Ok(Err(join_err)) => Err(PipelineError::Collaborator {
            stage,
            source: anyhow::Error::new(join_err).context("worker panicked"),
        }),
        Err(_) => Err(PipelineError::Timeout { stage, timeout }),
    }
}
