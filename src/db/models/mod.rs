pub mod access_log;
pub mod plate;
pub mod vehicle;
pub mod vehicle_log;

pub use access_log::AccessLog;
pub use plate::Plate;
pub use vehicle::Vehicle;
pub use vehicle_log::{
    LogFilter, LogStats, LogStatus, LogStatusFilter, Presence, VehicleLogEntry, VehicleLogView,
};
