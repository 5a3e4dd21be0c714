use chrono::Duration;
use serde::Serialize;

use crate::db::{Vehicle, VehicleLogEntry};

/// Presence change caused by one sighting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionEvent {
    LoggedIn {
        entry: VehicleLogEntry,
    },
    LoggedOut {
        entry: VehicleLogEntry,
        #[serde(skip)]
        duration: Duration,
    },
}

impl SessionEvent {
    pub fn entry(&self) -> &VehicleLogEntry {
        match self {
            SessionEvent::LoggedIn { entry } | SessionEvent::LoggedOut { entry, .. } => entry,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SessionEvent::LoggedIn { .. } => "Vehicle logged in",
            SessionEvent::LoggedOut { .. } => "Vehicle logged out",
        }
    }
}

/// Flat view of everything a sighting produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackerEvent {
    VehicleCreated { vehicle_id: i64 },
    LoggedIn { vehicle_id: i64, log_id: i64 },
    LoggedOut { vehicle_id: i64, log_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SightingOutcome {
    pub vehicle: Vehicle,
    pub vehicle_created: bool,
    pub event: SessionEvent,
}

impl SightingOutcome {
    pub fn events(&self) -> Vec<TrackerEvent> {
        let vehicle_id = self.vehicle.id;
        let mut events = Vec::with_capacity(2);
        if self.vehicle_created {
            events.push(TrackerEvent::VehicleCreated { vehicle_id });
        }
        let log_id = self.event.entry().id;
        events.push(match self.event {
            SessionEvent::LoggedIn { .. } => TrackerEvent::LoggedIn { vehicle_id, log_id },
            SessionEvent::LoggedOut { .. } => TrackerEvent::LoggedOut { vehicle_id, log_id },
        });
        events
    }
}
