use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A distinct plate signature, created once on first sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plate {
    pub id: i64,
    pub letters: String,
    pub digits: String,
    pub created_at: DateTime<Utc>,
}
