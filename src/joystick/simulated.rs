//! In-process virtual joystick driver
//!
//! Stands in for the vJoy driver when no native binding is available. Clones
//! share the same device table, so a test can keep one handle to inspect and
//! perturb devices while the feeders drive the other.

use super::driver::{DriverStatus, JoystickDriver};
use super::report::JoystickReport;
use crate::model::AxisName;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// One simulated device slot
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub axis_min: i64,
    pub axis_max: i64,
    pub axes_enabled: [bool; AxisName::COUNT],
    pub button_count: u8,
    pub owned: bool,
    /// Held by some other process
    pub busy: bool,
    pub report: JoystickReport,
    pub writes: usize,
    pub fail_writes: bool,
}

impl Default for SimulatedDevice {
    /// vJoy defaults: all axes at 0..=32767, 32 buttons
    fn default() -> Self {
        Self {
            axis_min: 0,
            axis_max: 32767,
            axes_enabled: [true; AxisName::COUNT],
            button_count: 32,
            owned: false,
            busy: false,
            report: JoystickReport::default(),
            writes: 0,
            fail_writes: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    devices: Arc<Mutex<HashMap<u8, SimulatedDevice>>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver with default devices `1..=count`
    pub fn with_devices(count: u8) -> Self {
        let driver = Self::new();
        for id in 1..=count {
            driver.add_device(id, SimulatedDevice::default());
        }
        driver
    }

    pub fn add_device(&self, device_id: u8, device: SimulatedDevice) {
        self.devices.lock().insert(device_id, device);
    }

    pub fn remove_device(&self, device_id: u8) {
        self.devices.lock().remove(&device_id);
    }

    pub fn set_busy(&self, device_id: u8, busy: bool) {
        if let Some(device) = self.devices.lock().get_mut(&device_id) {
            device.busy = busy;
        }
    }

    pub fn fail_writes(&self, device_id: u8, fail: bool) {
        if let Some(device) = self.devices.lock().get_mut(&device_id) {
            device.fail_writes = fail;
        }
    }

    /// Last report written to the device
    pub fn report(&self, device_id: u8) -> Option<JoystickReport> {
        self.devices.lock().get(&device_id).map(|d| d.report)
    }

    pub fn write_count(&self, device_id: u8) -> usize {
        self.devices
            .lock()
            .get(&device_id)
            .map(|d| d.writes)
            .unwrap_or(0)
    }
}

impl JoystickDriver for SimulatedDriver {
    fn acquire(&mut self, device_id: u8) -> bool {
        let mut devices = self.devices.lock();
        match devices.get_mut(&device_id) {
            Some(device) if device.owned => true,
            Some(device) if !device.busy => {
                device.owned = true;
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, device_id: u8) {
        if let Some(device) = self.devices.lock().get_mut(&device_id) {
            device.owned = false;
        }
    }

    fn status(&mut self, device_id: u8) -> DriverStatus {
        match self.devices.lock().get(&device_id) {
            None => DriverStatus::Missing,
            Some(device) if device.owned => DriverStatus::Owned,
            Some(device) if device.busy => DriverStatus::Busy,
            Some(_) => DriverStatus::Free,
        }
    }

    fn axis_range(&mut self, device_id: u8, axis: AxisName) -> Option<(i64, i64)> {
        let devices = self.devices.lock();
        let device = devices.get(&device_id)?;
        device.axes_enabled[axis.index()].then_some((device.axis_min, device.axis_max))
    }

    fn button_count(&mut self, device_id: u8) -> u8 {
        self.devices
            .lock()
            .get(&device_id)
            .map(|d| d.button_count)
            .unwrap_or(0)
    }

    fn read_report(&mut self, device_id: u8) -> Option<JoystickReport> {
        self.report(device_id)
    }

    fn write_report(&mut self, device_id: u8, report: &JoystickReport) -> bool {
        let mut devices = self.devices.lock();
        match devices.get_mut(&device_id) {
            Some(device) if device.owned && !device.fail_writes => {
                device.report = *report;
                device.writes += 1;
                trace!("Simulated device {} report written", device_id);
                true
            }
            _ => false,
        }
    }

    fn versions(&mut self) -> (u32, u32) {
        (0x0218, 0x0218)
    }
}
