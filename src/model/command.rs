//! Commands bind a MIDI event signature to a joystick action

use super::action::{ActionKind, JoystickAction};
use super::event::{CommandKey, MidiEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A binding (non-empty `id`) or a learned, unassigned control (empty `id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Persistent binding id; empty for learned commands
    #[serde(default)]
    pub id: String,
    /// Display label
    pub name: String,
    pub event: MidiEvent,
    pub action: JoystickAction,
}

impl Command {
    /// Unbound placeholder for a raw event with no action yet
    pub fn learned(event: MidiEvent) -> Self {
        Self {
            id: String::new(),
            name: event.event.clone(),
            event,
            action: JoystickAction::default(),
        }
    }

    /// Bound copy of this command with a fresh id and the given action
    pub fn bind(&self, action: JoystickAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: self.name.clone(),
            event: self.event.clone(),
            action,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the trigger range `[low, high]`
    pub fn with_range(mut self, low: i32, high: i32) -> Self {
        self.event = self.event.with_range(low, high);
        self
    }

    pub fn key(&self) -> CommandKey {
        self.event.key()
    }

    /// Has a persistent id
    pub fn is_bound(&self) -> bool {
        !self.id.is_empty()
    }

    /// Bound with a real action, i.e. eligible for persistence
    pub fn is_persistable(&self) -> bool {
        self.is_bound() && self.action.kind != ActionKind::None
    }
}
