//! MIDI event signatures and the key used to bucket them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical control: (device, event)
///
/// Bound commands sharing a key are disambiguated by their value range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandKey {
    /// Device key (e.g. "Controller-X")
    pub device: String,
    /// Event key within the device (e.g. "Note C4", "Ctrl 7")
    pub event: String,
}

impl CommandKey {
    pub fn new(device: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            event: event.into(),
        }
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.device, self.event)
    }
}

/// A single reading from a MIDI control
///
/// `value..=value_range_high` is the trigger range claimed by a binding;
/// for raw input both ends are the observed reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub device: String,
    pub event: String,
    /// Last observed reading (low end of the trigger range)
    pub value: i32,
    /// High end of the trigger range
    pub value_range_high: i32,
    /// Lowest legal reading of the control
    pub value_min: i32,
    /// Highest legal reading of the control
    pub value_max: i32,
}

impl MidiEvent {
    /// Create an event from a raw reading; the trigger range collapses to `value`
    pub fn new(
        device: impl Into<String>,
        event: impl Into<String>,
        value: i32,
        value_min: i32,
        value_max: i32,
    ) -> Self {
        Self {
            device: device.into(),
            event: event.into(),
            value,
            value_range_high: value,
            value_min,
            value_max,
        }
    }

    /// Lookup key of this event
    pub fn key(&self) -> CommandKey {
        CommandKey::new(self.device.clone(), self.event.clone())
    }

    /// Replace the trigger range
    pub fn with_range(mut self, low: i32, high: i32) -> Self {
        self.value = low;
        self.value_range_high = high;
        self
    }

    /// Whether `reading` falls inside `[value, value_range_high]`
    pub fn contains(&self, reading: i32) -> bool {
        self.value <= reading && reading <= self.value_range_high
    }

    /// Position of `reading` within `[value_min, value_max]`, clamped to `0.0..=1.0`
    pub fn fraction_of(&self, reading: i32) -> f64 {
        let range = f64::from(self.value_max) - f64::from(self.value_min);
        if range <= 0.0 {
            return 0.0;
        }
        let offset = f64::from(reading) - f64::from(self.value_min);
        (offset / range).clamp(0.0, 1.0)
    }

    /// Whether `value_min <= value <= value_range_high <= value_max` holds
    pub fn is_well_formed(&self) -> bool {
        self.value_min <= self.value
            && self.value <= self.value_range_high
            && self.value_range_high <= self.value_max
    }
}
