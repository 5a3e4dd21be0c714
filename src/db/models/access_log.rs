use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit row written for each plate the pipeline acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    pub id: Option<i64>,
    pub plate_text: String,
    pub recognized: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
