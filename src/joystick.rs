//! Virtual joystick feeding
//!
//! A [`Feeder`] owns one virtual device: its status, hardware snapshot and
//! in-memory report. All feeders share a single [`SharedDriver`] whose lock
//! serializes every individual driver call. [`JoyManager`] creates the
//! feeders and runs their jittered status-poll loops.

mod driver;
mod feeder;
mod manager;
pub mod report;
mod simulated;

pub use driver::{DriverStatus, JoystickDriver, SharedDriver};
pub use feeder::{Feeder, FeederOptions, JoystickState, StatusChanged};
pub use manager::{DriverVersions, JoyManager, PollSchedule, MAX_DEVICES};
pub use report::{Hardware, JoystickReport};
pub use simulated::{SimulatedDevice, SimulatedDriver};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical status of a virtual device as seen by this feeder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoystickStatus {
    /// Not yet polled, or missing/disabled at the driver
    #[default]
    Unknown,
    /// Available for acquisition
    Free,
    /// Acquired by this feeder
    Engaged,
    /// Acquired by another process
    Occupied,
}

impl JoystickStatus {
    /// Map raw driver status
    pub fn from_driver(status: DriverStatus) -> Self {
        match status {
            DriverStatus::Free => JoystickStatus::Free,
            DriverStatus::Owned => JoystickStatus::Engaged,
            DriverStatus::Busy => JoystickStatus::Occupied,
            DriverStatus::Missing => JoystickStatus::Unknown,
        }
    }
}

impl fmt::Display for JoystickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoystickStatus::Unknown => write!(f, "unknown"),
            JoystickStatus::Free => write!(f, "free"),
            JoystickStatus::Engaged => write!(f, "engaged"),
            JoystickStatus::Occupied => write!(f, "occupied"),
        }
    }
}
