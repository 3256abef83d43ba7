//! Virtual joystick driver seam

use super::report::JoystickReport;
use crate::model::AxisName;
use parking_lot::Mutex;
use std::sync::Arc;

/// Raw device status as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverStatus {
    /// Available for acquisition
    Free,
    /// Acquired by this process
    Owned,
    /// Acquired by another process
    Busy,
    /// Not installed or disabled
    Missing,
}

/// Operations the feeders need from a virtual joystick driver
///
/// Implementations are not expected to be thread-safe; callers go through
/// [`SharedDriver`], which serializes every call.
pub trait JoystickDriver: Send {
    fn acquire(&mut self, device_id: u8) -> bool;

    fn release(&mut self, device_id: u8);

    fn status(&mut self, device_id: u8) -> DriverStatus;

    /// Logical `(min, max)` of an axis, or `None` if the axis is absent
    fn axis_range(&mut self, device_id: u8, axis: AxisName) -> Option<(i64, i64)>;

    fn button_count(&mut self, device_id: u8) -> u8;

    /// Current device report, or `None` if it cannot be read
    fn read_report(&mut self, device_id: u8) -> Option<JoystickReport>;

    fn write_report(&mut self, device_id: u8, report: &JoystickReport) -> bool;

    /// `(library version, driver version)`
    fn versions(&mut self) -> (u32, u32) {
        (0, 0)
    }
}

/// Process-wide handle to the single driver instance
#[derive(Clone)]
pub struct SharedDriver {
    inner: Arc<Mutex<Box<dyn JoystickDriver>>>,
}

impl SharedDriver {
    pub fn new<D: JoystickDriver + 'static>(driver: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(driver))),
        }
    }

    /// Run `f` with exclusive access to the driver
    ///
    /// Keep `f` short: every feeder and poll loop contends on this lock.
    pub fn call<R>(&self, f: impl FnOnce(&mut dyn JoystickDriver) -> R) -> R {
        let mut driver = self.inner.lock();
        f(driver.as_mut())
    }
}

impl std::fmt::Debug for SharedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDriver").finish_non_exhaustive()
    }
}
