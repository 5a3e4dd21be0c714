//! Vehicle presence log.
//!
//! Each row is one login/logout bracket: it is inserted on login and closed in
//! place on the following logout.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Login,
    Logout,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Login => "login",
            LogStatus::Logout => "logout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLogEntry {
    pub id: i64,
    pub vehicle_id: i64,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: LogStatus,
}

impl VehicleLogEntry {
    /// Latest instant recorded on this row.
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.check_out.unwrap_or(self.check_in)
    }
}

/// Whether a vehicle is currently inside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Presence {
    /// No log yet, or the latest entry is closed.
    CanEnter,
    /// The latest entry is an open login.
    CanExit,
}

impl Presence {
    pub fn from_latest(latest: Option<&VehicleLogEntry>) -> Self {
        match latest {
            Some(entry) if entry.status == LogStatus::Login => Presence::CanExit,
            _ => Presence::CanEnter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LogStatusFilter {
    #[default]
    All,
    /// Entries without a check-out.
    Active,
    /// Entries with a check-out.
    Completed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub status: LogStatusFilter,
    /// Substring matched against plate letters or digits.
    pub search: Option<String>,
    /// Only entries checked in on this UTC date.
    pub date: Option<NaiveDate>,
}

/// A log entry joined with the plate it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLogView {
    pub entry: VehicleLogEntry,
    pub plate_id: i64,
    pub letters: String,
    pub digits: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total_logins: u64,
    pub active_logins: u64,
}
