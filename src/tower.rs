//! Dispatch tower: routes MIDI events to joystick feeders
//!
//! Every incoming event is resolved against the command store. A match is
//! applied to the feeder named by its action; anything else is learned as
//! an unbound command so it shows up for binding.

use crate::commands::CommandStore;
use crate::events::{Observers, SubscriptionId};
use crate::joystick::JoyManager;
use crate::midi::{MidiSource, MidiSourceError};
use crate::model::{Command, MidiEvent};
use std::sync::Arc;
use tracing::{debug, trace};

/// Published for every event the tower handles
#[derive(Debug, Clone)]
pub struct ActionReceived {
    /// Resolved command, or the unbound one learned from the event
    pub command: Command,
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Feeder accepted the action
    Applied,
    /// Feeder refused the action (not acquired, unsupported, click pending)
    Rejected,
    /// Action targets a device that does not exist
    NoDevice,
    /// No binding matched; the event was stored as an unbound command
    Learned,
}

pub struct DispatchTower {
    store: Arc<CommandStore>,
    joysticks: Arc<JoyManager>,
    received: Observers<ActionReceived>,
}

impl DispatchTower {
    pub fn new(store: Arc<CommandStore>, joysticks: Arc<JoyManager>) -> Self {
        Self {
            store,
            joysticks,
            received: Observers::new(),
        }
    }

    pub fn store(&self) -> &Arc<CommandStore> {
        &self.store
    }

    pub fn joysticks(&self) -> &Arc<JoyManager> {
        &self.joysticks
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ActionReceived) + Send + Sync + 'static,
    {
        self.received.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.received.unsubscribe(id)
    }

    /// Route every event of `source` through this tower
    pub fn attach(self: &Arc<Self>, source: &dyn MidiSource) -> Result<usize, MidiSourceError> {
        let tower = Arc::clone(self);
        source.subscribe(Arc::new(move |event| {
            tower.on_midi_event(event);
        }))
    }

    pub fn on_midi_event(&self, event: MidiEvent) -> DispatchOutcome {
        let Some(command) = self.store.get_action(&event) else {
            let learned = Command::learned(event);
            trace!("Learning {}", learned.key());
            self.received.emit(&ActionReceived {
                command: learned.clone(),
                resolved: false,
            });
            self.store.add_command(learned);
            return DispatchOutcome::Learned;
        };

        self.received.emit(&ActionReceived {
            command: command.clone(),
            resolved: true,
        });

        let device_id = command.action.device_id;
        let (Some(feeder), Some(action)) = (
            self.joysticks.joystick(device_id),
            command.action.feeder_action(),
        ) else {
            debug!("{} targets missing joystick {}", command.key(), device_id);
            return DispatchOutcome::NoDevice;
        };

        if feeder.set(action) {
            DispatchOutcome::Applied
        } else {
            DispatchOutcome::Rejected
        }
    }
}
