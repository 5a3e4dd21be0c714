use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The vehicle carrying a plate. One per plate, imaged once on first sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    pub plate_id: i64,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}
