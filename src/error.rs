use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Fatal problems while assembling the pipeline.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load settings: {0}")]
    Settings(#[source] anyhow::Error),
    #[error("failed to open plate store: {0}")]
    Storage(#[source] anyhow::Error),
    #[error("failed to load {component}: {source}")]
    Component {
        component: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures that abort the processing of a single detection.
///
/// None of these stop the frame loop; durable state is left as it was.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} timed out after {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: Duration,
    },
    #[error("{stage} failed: {source}")]
    Collaborator {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("storage unavailable: {0}")]
    Storage(#[source] anyhow::Error),
    #[error("image handling failed: {0}")]
    Image(#[source] anyhow::Error),
    #[error("sighting of vehicle {vehicle_id} at {captured_at} predates its last transition at {latest}")]
    StaleSighting {
        vehicle_id: i64,
        captured_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

impl PipelineError {
    /// Whether retrying the same detection later could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PipelineError::StaleSighting { .. })
    }
}
