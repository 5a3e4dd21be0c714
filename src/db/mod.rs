mod connection;
mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::{
    AccessLog, LogFilter, LogStats, LogStatus, LogStatusFilter, Plate, Presence, Vehicle,
    VehicleLogEntry, VehicleLogView,
};
pub use repositories::{AppliedSighting, LogTransition, PlateResolution};
