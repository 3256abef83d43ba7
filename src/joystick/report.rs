//! Report math, independent of any driver
//!
//! Everything here is a pure function of the hardware snapshot and the
//! requested action, so it can be checked without a device.

use crate::model::{AxisAction, AxisName, AxisSubtype, ButtonNumber};
use serde::{Deserialize, Serialize};

/// Capability snapshot taken when a device is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardware {
    pub axis_min: i64,
    pub axis_max: i64,
    /// Indexed by `AxisName::index`
    pub axes_enabled: [bool; AxisName::COUNT],
    pub button_count: u8,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            axis_min: 0,
            axis_max: 0,
            axes_enabled: [false; AxisName::COUNT],
            button_count: 0,
        }
    }
}

impl Hardware {
    pub fn is_axis_enabled(&self, axis: AxisName) -> bool {
        self.axes_enabled[axis.index()]
    }

    pub fn enabled_axis_count(&self) -> usize {
        self.axes_enabled.iter().filter(|enabled| **enabled).count()
    }

    pub fn supports_button(&self, number: ButtonNumber) -> bool {
        number.get() <= self.button_count
    }

    /// Raw value at `percent` of the axis range, rounded to nearest
    pub fn percent_to_raw(&self, percent: f64) -> i32 {
        let span = (self.axis_max - self.axis_min) as f64;
        (self.axis_min as f64 + percent * span).round() as i32
    }

    /// Inverse of `percent_to_raw`, clamped to `0.0..=1.0`
    pub fn raw_to_percent(&self, raw: i32) -> f64 {
        let span = (self.axis_max - self.axis_min) as f64;
        if span <= 0.0 {
            return 0.0;
        }
        ((f64::from(raw) - self.axis_min as f64) / span).clamp(0.0, 1.0)
    }

    pub fn mid(&self) -> i32 {
        self.percent_to_raw(0.5)
    }

    /// Resting position of an axis after reset
    pub fn rest(&self, axis: AxisName) -> i32 {
        if axis.rests_at_minimum() {
            self.axis_min as i32
        } else {
            self.mid()
        }
    }
}

/// In-memory copy of a device's position report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoystickReport {
    /// Raw axis values, indexed by `AxisName::index`
    pub axes: [i32; AxisName::COUNT],
    /// Bit `n - 1` is button `n`
    pub buttons: u128,
}

impl JoystickReport {
    /// Every axis at rest, no button pressed
    pub fn reset(hardware: &Hardware) -> Self {
        let mut report = Self::default();
        for axis in AxisName::all() {
            report.axes[axis.index()] = hardware.rest(*axis);
        }
        report
    }

    pub fn axis(&self, axis: AxisName) -> i32 {
        self.axes[axis.index()]
    }

    pub fn set_axis(&mut self, axis: AxisName, value: i32) {
        self.axes[axis.index()] = value;
    }

    pub fn button(&self, number: ButtonNumber) -> bool {
        self.buttons & number.mask() != 0
    }

    pub fn set_button(&mut self, number: ButtonNumber, on: bool) {
        self.buttons = button_mask(self.buttons, number, on);
    }

    /// Pressed buttons, lowest first
    pub fn pressed_buttons(&self) -> Vec<ButtonNumber> {
        (1..=ButtonNumber::MAX)
            .filter_map(ButtonNumber::new)
            .filter(|number| self.button(*number))
            .collect()
    }
}

/// Target raw value for an axis action, given the axis' current raw value
///
/// Steps leaving the axis range collapse to mid-scale instead of saturating.
pub fn axis_target(hardware: &Hardware, current: i32, action: &AxisAction) -> i32 {
    match action.subtype {
        AxisSubtype::Absolute => hardware.percent_to_raw(action.percent.clamp(0.0, 1.0)),
        AxisSubtype::Increment => step(hardware, current, 1),
        AxisSubtype::Decrement => step(hardware, current, -1),
    }
}

fn step(hardware: &Hardware, current: i32, delta: i64) -> i32 {
    let next = i64::from(current) + delta;
    if next < hardware.axis_min || next > hardware.axis_max {
        hardware.mid()
    } else {
        next as i32
    }
}

/// Set or clear one button bit
pub fn button_mask(buttons: u128, number: ButtonNumber, on: bool) -> u128 {
    if on {
        buttons | number.mask()
    } else {
        buttons & !number.mask()
    }
}

/// Apply an axis action; false if the axis is not present on the device
pub fn apply_axis(report: &mut JoystickReport, hardware: &Hardware, action: &AxisAction) -> bool {
    if !hardware.is_axis_enabled(action.name) {
        return false;
    }
    let target = axis_target(hardware, report.axis(action.name), action);
    report.set_axis(action.name, target);
    true
}

/// Apply a button state; false if the device has fewer buttons
pub fn apply_button(
    report: &mut JoystickReport,
    hardware: &Hardware,
    number: ButtonNumber,
    on: bool,
) -> bool {
    if !hardware.supports_button(number) {
        return false;
    }
    report.set_button(number, on);
    true
}
