use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{FrameGate, Pipeline, PlateOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub struct Frame {
    pub image: DynamicImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn now(image: DynamicImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }
}

/// A camera, a video file, a directory of stills.
///
/// `next_frame` may block; it runs on the blocking pool. `Ok(None)` means the
/// source is exhausted.
pub trait FrameSource: Send + 'static {
    fn name(&self) -> &str;
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub frames_skipped: u64,
    pub frames_failed: u64,
    pub plates_read: u64,
    pub plates_failed: u64,
}

/// Runs one worker per frame source against a shared pipeline.
///
/// Each worker keeps at most one frame in flight, so a slow pipeline drops
/// nothing; it simply reads the next frame later.
pub struct SourceController {
    pipeline: Arc<Pipeline>,
    cancel_token: CancellationToken,
    handles: Vec<(String, JoinHandle<SourceStats>)>,
}

impl SourceController {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            cancel_token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn spawn(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            bail!("controller already stopped");
        }
        let name = source.name().to_string();
        log_info!("starting frame source {name}");

        let gate = FrameGate::new(self.pipeline.settings().frame_gate.clone());
        let handle = tokio::spawn(source_loop(
            source,
            Arc::clone(&self.pipeline),
            gate,
            self.cancel_token.clone(),
        ));
        self.handles.push((name, handle));
        Ok(())
    }

    /// Waits for every source to run dry.
    pub async fn wait(&mut self) -> Result<Vec<(String, SourceStats)>> {
        let mut results = Vec::with_capacity(self.handles.len());
        for (name, handle) in self.handles.drain(..) {
            let stats = handle
                .await
                .with_context(|| format!("frame source {name} task failed to join"))?;
            results.push((name, stats));
        }
        Ok(results)
    }

    /// Cancels all sources; frames already in the pipeline finish first.
    pub async fn stop(&mut self) -> Result<Vec<(String, SourceStats)>> {
        self.cancel_token.cancel();
        self.wait().await
    }
}

pub(crate) async fn source_loop(
    mut source: Box<dyn FrameSource>,
    pipeline: Arc<Pipeline>,
    mut gate: FrameGate,
    cancel_token: CancellationToken,
) -> SourceStats {
    let name = source.name().to_string();
    let mut stats = SourceStats::default();

    loop {
        let fetch = tokio::task::spawn_blocking(move || {
            let frame = source.next_frame();
            (source, frame)
        });

        let (returned, next) = tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("frame source {name} shutting down");
                break;
            }
            joined = fetch => match joined {
                Ok(pair) => pair,
                Err(err) => {
                    log_error!("frame source {name} reader panicked: {err}");
                    break;
                }
            }
        };
        source = returned;

        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log_info!("frame source {name} exhausted after {} frame(s)", stats.frames_read);
                break;
            }
            Err(err) => {
                log_error!("frame source {name} failed: {err:#}");
                break;
            }
        };
        stats.frames_read += 1;

        if !gate.admit(&frame.image) {
            stats.frames_skipped += 1;
            continue;
        }

        match pipeline.process_frame(&frame.image, frame.captured_at).await {
            Ok(readings) => {
                for reading in &readings {
                    match reading.outcome {
                        PlateOutcome::Failed(_) => stats.plates_failed += 1,
                        PlateOutcome::NoText | PlateOutcome::Duplicate => {}
                        _ => stats.plates_read += 1,
                    }
                }
            }
            Err(err) => {
                stats.frames_failed += 1;
                log_warn!("frame from {name} dropped: {err}");
            }
        }
    }

    stats
}
