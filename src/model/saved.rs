//! Flat, serializable projection of a command

use super::action::{
    ActionKind, AxisAction, AxisName, AxisSubtype, ButtonAction, ButtonNumber, ButtonSubtype,
    JoystickAction,
};
use super::command::Command;
use super::event::MidiEvent;
use serde::{Deserialize, Serialize};

/// Persisted shape of a binding
///
/// Runtime-only fields (axis percent, resolved button state) are not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCommand {
    pub id: String,
    pub name: String,
    pub device: String,
    pub event: String,
    pub trigger_low: i32,
    pub trigger_high: i32,
    pub value_min: i32,
    pub value_max: i32,
    pub device_id: u8,
    pub kind: ActionKind,
    pub axis_name: AxisName,
    #[serde(default)]
    pub axis_subtype: AxisSubtype,
    pub button_number: ButtonNumber,
    #[serde(default)]
    pub button_subtype: ButtonSubtype,
}

impl From<&Command> for SavedCommand {
    fn from(cmd: &Command) -> Self {
        Self {
            id: cmd.id.clone(),
            name: cmd.name.clone(),
            device: cmd.event.device.clone(),
            event: cmd.event.event.clone(),
            trigger_low: cmd.event.value,
            trigger_high: cmd.event.value_range_high,
            value_min: cmd.event.value_min,
            value_max: cmd.event.value_max,
            device_id: cmd.action.device_id,
            kind: cmd.action.kind,
            axis_name: cmd.action.axis.name,
            axis_subtype: cmd.action.axis.subtype,
            button_number: cmd.action.button.number,
            button_subtype: cmd.action.button.subtype,
        }
    }
}

impl From<SavedCommand> for Command {
    fn from(saved: SavedCommand) -> Self {
        let event = MidiEvent::new(
            saved.device,
            saved.event,
            saved.trigger_low,
            saved.value_min,
            saved.value_max,
        )
        .with_range(saved.trigger_low, saved.trigger_high);

        Self {
            id: saved.id,
            name: saved.name,
            event,
            action: JoystickAction {
                device_id: saved.device_id,
                kind: saved.kind,
                axis: AxisAction::step(saved.axis_name, saved.axis_subtype),
                button: ButtonAction::new(saved.button_number, saved.button_subtype),
            },
        }
    }
}
