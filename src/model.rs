//! Event model - MIDI events, joystick actions and the commands binding them
//!
//! All types here are plain values. The command store hands out clones, so a
//! `Command` observed by a caller is never mutated behind its back.

mod action;
mod command;
mod event;
mod saved;

pub use action::{
    ActionKind, AxisAction, AxisName, AxisSubtype, ButtonAction, ButtonNumber, ButtonSubtype,
    FeederAction, JoystickAction, DEFAULT_DEVICE_ID,
};
pub use command::Command;
pub use event::{CommandKey, MidiEvent};
pub use saved::SavedCommand;
