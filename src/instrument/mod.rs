pub mod mpm;
pub mod tsl;

pub use mpm::{MeasurementStatus, Mpm, RangeMode};
pub use tsl::{LaserSweepState, Tsl};
