//! Per-device feeder state machine

use super::driver::{JoystickDriver, SharedDriver};
use super::report::{self, Hardware, JoystickReport};
use super::JoystickStatus;
use crate::events::Observers;
use crate::model::{AxisName, ButtonAction, ButtonNumber, ButtonSubtype, FeederAction};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Published whenever a device's polled status actually changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChanged {
    pub device_id: u8,
    pub status: JoystickStatus,
}

/// Read-back of a device's current position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoystickState {
    /// Device acquired and its report read back from the driver
    pub ok: bool,
    pub report: JoystickReport,
}

#[derive(Debug, Clone)]
pub struct FeederOptions {
    /// How long a click keeps its button pressed
    pub click_hold: Duration,
}

impl Default for FeederOptions {
    fn default() -> Self {
        Self {
            click_hold: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Default)]
struct Instance {
    ok: bool,
    hardware: Hardware,
    report: JoystickReport,
}

/// Owns one virtual joystick device
///
/// Lock order is instance, then status, then the driver. The report is only
/// committed after the driver accepted it, so the in-memory copy never runs
/// ahead of the device.
pub struct Feeder {
    id: u8,
    driver: SharedDriver,
    instance: Mutex<Instance>,
    status: Mutex<JoystickStatus>,
    click_pending: AtomicBool,
    click_hold: Duration,
    runtime: Option<Handle>,
    observers: Arc<Observers<StatusChanged>>,
}

impl Feeder {
    pub fn new(
        id: u8,
        driver: SharedDriver,
        options: FeederOptions,
        observers: Arc<Observers<StatusChanged>>,
    ) -> Self {
        Self {
            id,
            driver,
            instance: Mutex::new(Instance::default()),
            status: Mutex::new(JoystickStatus::Unknown),
            click_pending: AtomicBool::new(false),
            click_hold: options.click_hold,
            runtime: Handle::try_current().ok(),
            observers,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn status(&self) -> JoystickStatus {
        *self.status.lock()
    }

    /// Whether this feeder currently holds the device
    pub fn is_acquired(&self) -> bool {
        self.instance.lock().ok
    }

    /// Capability snapshot from the last acquisition
    pub fn hardware(&self) -> Hardware {
        self.instance.lock().hardware
    }

    /// Raw axis value as a fraction of the device's axis range
    pub fn display_percent(&self, raw: i32) -> f64 {
        self.instance.lock().hardware.raw_to_percent(raw)
    }

    pub async fn acquire(self: &Arc<Self>) -> bool {
        let feeder = Arc::clone(self);
        match tokio::task::spawn_blocking(move || feeder.acquire_blocking()).await {
            Ok(acquired) => acquired,
            Err(e) => {
                error!("Acquire task for joystick {} failed: {}", self.id, e);
                false
            }
        }
    }

    pub fn acquire_blocking(&self) -> bool {
        let mut instance = self.instance.lock();

        if !self.driver.call(|driver| driver.acquire(self.id)) {
            warn!("Failed to acquire joystick {}", self.id);
            return false;
        }

        let hardware = self.driver.call(|driver| probe_hardware(driver, self.id));
        let reset = JoystickReport::reset(&hardware);
        if !self.driver.call(|driver| driver.write_report(self.id, &reset)) {
            warn!("Joystick {} acquired but initial report was rejected", self.id);
        }

        *instance = Instance {
            ok: true,
            hardware,
            report: reset,
        };
        drop(instance);

        info!(
            "Joystick {} acquired: {} axes, {} buttons",
            self.id,
            hardware.enabled_axis_count(),
            hardware.button_count
        );
        self.update_status();
        true
    }

    pub async fn release(self: &Arc<Self>) {
        let feeder = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || feeder.release_blocking()).await {
            error!("Release task for joystick {} failed: {}", self.id, e);
        }
    }

    pub fn release_blocking(&self) {
        let mut instance = self.instance.lock();
        self.driver.call(|driver| driver.release(self.id));
        instance.ok = false;
        drop(instance);

        info!("Joystick {} released", self.id);
        self.update_status();
    }

    /// Poll the driver and publish a change if the status moved
    ///
    /// The status lock is held across the driver poll so concurrent polls
    /// store their results in the order the driver answered them.
    pub fn update_status(&self) -> JoystickStatus {
        let (previous, polled) = {
            let mut status = self.status.lock();
            let polled =
                JoystickStatus::from_driver(self.driver.call(|driver| driver.status(self.id)));
            (std::mem::replace(&mut *status, polled), polled)
        };

        if previous != polled {
            debug!("Joystick {} status: {} -> {}", self.id, previous, polled);
            self.observers.emit(&StatusChanged {
                device_id: self.id,
                status: polled,
            });
        } else {
            trace!("Joystick {} status unchanged ({})", self.id, polled);
        }
        polled
    }

    /// Apply an action and push the resulting report to the device
    pub fn set(self: &Arc<Self>, action: FeederAction) -> bool {
        match action {
            FeederAction::Axis(axis) => {
                self.commit(|next, hw| report::apply_axis(next, hw, &axis))
            }
            FeederAction::Button(ButtonAction {
                number,
                subtype: ButtonSubtype::Click,
                ..
            }) => self.click(number),
            FeederAction::Button(button) => {
                self.commit(|next, hw| report::apply_button(next, hw, button.number, button.is_on()))
            }
        }
    }

    /// Device report as currently held by the driver
    pub fn state(&self) -> JoystickState {
        let instance = self.instance.lock();
        let read = if instance.ok {
            self.driver.call(|driver| driver.read_report(self.id))
        } else {
            None
        };
        JoystickState {
            ok: read.is_some(),
            report: read.unwrap_or(instance.report),
        }
    }

    fn commit(&self, apply: impl FnOnce(&mut JoystickReport, &Hardware) -> bool) -> bool {
        let mut instance = self.instance.lock();
        if !instance.ok {
            debug!("Joystick {} not acquired, action dropped", self.id);
            return false;
        }

        let mut next = instance.report;
        if !apply(&mut next, &instance.hardware) {
            debug!("Joystick {} does not support the requested action", self.id);
            return false;
        }

        if !self.driver.call(|driver| driver.write_report(self.id, &next)) {
            warn!("Joystick {} rejected report update", self.id);
            return false;
        }
        instance.report = next;
        true
    }

    fn click(self: &Arc<Self>, number: ButtonNumber) -> bool {
        if self
            .click_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(
                "Joystick {} click on button {} rejected, one already pending",
                self.id, number
            );
            return false;
        }

        if !self.commit(|next, hw| report::apply_button(next, hw, number, true)) {
            self.click_pending.store(false, Ordering::Release);
            return false;
        }

        let feeder = Arc::clone(self);
        let hold = self.click_hold;
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(hold).await;
                    feeder.finish_click(number);
                });
            }
            None => {
                std::thread::spawn(move || {
                    std::thread::sleep(hold);
                    feeder.finish_click(number);
                });
            }
        }
        true
    }

    fn finish_click(&self, number: ButtonNumber) {
        // Release is sent twice; a single release is occasionally lost by the driver
        for _ in 0..2 {
            self.commit(|next, hw| report::apply_button(next, hw, number, false));
        }
        self.click_pending.store(false, Ordering::Release);
        trace!("Joystick {} click on button {} done", self.id, number);
    }
}

fn probe_hardware(driver: &mut dyn JoystickDriver, id: u8) -> Hardware {
    let mut hardware = Hardware::default();
    let mut range = None;

    for axis in AxisName::all() {
        if let Some(bounds) = driver.axis_range(id, *axis) {
            hardware.axes_enabled[axis.index()] = true;
            range.get_or_insert(bounds);
        }
    }

    if let Some((min, max)) = range {
        hardware.axis_min = min;
        hardware.axis_max = max;
    }
    hardware.button_count = driver.button_count(id).min(ButtonNumber::MAX);
    hardware
}
