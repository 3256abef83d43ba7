//! Resolve a MIDI event against the bound commands of its key
//!
//! Axis bindings are searched before button bindings. Within each kind the
//! first command (insertion order) whose trigger range contains the reading
//! wins; overlapping ranges are not an error.

use crate::model::{ActionKind, ButtonSubtype, Command, MidiEvent};

/// Pick the command triggered by `query` from one key's bucket
///
/// Returns a copy carrying the computed axis percent or button state; the
/// bucket itself is never modified.
pub fn resolve(bucket: &[Command], query: &MidiEvent) -> Option<Command> {
    let reading = query.value;

    if let Some(axis) = bucket
        .iter()
        .filter(|cmd| cmd.action.kind == ActionKind::Axis)
        .find(|cmd| cmd.event.contains(reading))
    {
        let mut resolved = axis.clone();
        resolved.action.axis.percent = axis.event.fraction_of(reading);
        return Some(resolved);
    }

    let button = bucket
        .iter()
        .filter(|cmd| cmd.action.kind == ActionKind::Button)
        .find(|cmd| cmd.event.contains(reading))?;

    let mut resolved = button.clone();
    resolved.action.button.logical_on = match button.action.button.subtype {
        ButtonSubtype::Auto => reading > button.event.value_min,
        other => other == ButtonSubtype::Press,
    };
    Some(resolved)
}
