pub mod access_logs;
pub mod plates;
pub mod vehicle_logs;
pub mod vehicles;

pub use plates::PlateResolution;
pub use vehicle_logs::{AppliedSighting, LogTransition};
