//! MIDI input
//!
//! Raw message parsing, conversion of channel messages into [`MidiEvent`]s,
//! and the sources that deliver them: [`MidirSource`] for real ports and
//! [`LoopbackSource`] for in-process injection.

use crate::model::MidiEvent;
use midir::{Ignore, MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Range of pitch bend events as published by sources
pub const PITCH_BEND_MAX: i32 = 16384;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Channel voice messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, centre 8192
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a channel message; system and running-status data yield `None`
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }

        let channel = status & 0x0F;
        let byte = |i: usize| rest.get(i).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: byte(0)?,
                velocity: byte(1)?,
            }),
            0x90 => {
                let (note, velocity) = (byte(0)?, byte(1)?);
                // Velocity 0 is a note off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff { channel, note, velocity })
                } else {
                    Some(MidiMessage::NoteOn { channel, note, velocity })
                }
            }
            0xA0 => Some(MidiMessage::PolyPressure {
                channel,
                note: byte(0)?,
                pressure: byte(1)?,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: byte(0)?,
                value: byte(1)?,
            }),
            0xC0 => Some(MidiMessage::ProgramChange {
                channel,
                program: byte(0)?,
            }),
            0xD0 => Some(MidiMessage::ChannelPressure {
                channel,
                pressure: byte(0)?,
            }),
            0xE0 => {
                let (lsb, msb) = (u16::from(byte(0)?), u16::from(byte(1)?));
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::PolyPressure { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ProgramChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ch = self.channel() + 1;
        match *self {
            MidiMessage::NoteOff { note, velocity, .. } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", ch, note, velocity)
            }
            MidiMessage::NoteOn { note, velocity, .. } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", ch, note, velocity)
            }
            MidiMessage::PolyPressure { note, pressure, .. } => {
                write!(f, "PolyPressure ch:{} n:{} p:{}", ch, note, pressure)
            }
            MidiMessage::ControlChange { cc, value, .. } => {
                write!(f, "CC ch:{} cc:{} v:{}", ch, cc, value)
            }
            MidiMessage::ProgramChange { program, .. } => {
                write!(f, "ProgramChange ch:{} p:{}", ch, program)
            }
            MidiMessage::ChannelPressure { pressure, .. } => {
                write!(f, "ChannelPressure ch:{} p:{}", ch, pressure)
            }
            MidiMessage::PitchBend { value, .. } => write!(f, "PitchBend ch:{} v:{}", ch, value),
        }
    }
}

/// Scientific pitch name, middle C (60) is `C4`
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(note % 12)], octave)
}

/// Event published for a message received on `device`
///
/// Only control change, note and pitch bend messages produce events.
pub fn to_midi_event(device: &str, message: &MidiMessage) -> Option<MidiEvent> {
    match *message {
        MidiMessage::ControlChange { cc, value, .. } => Some(MidiEvent::new(
            device,
            format!("Ctrl {}", cc),
            i32::from(value),
            0,
            127,
        )),
        MidiMessage::NoteOn { note, velocity, .. } => Some(MidiEvent::new(
            device,
            format!("Note {}", note_name(note)),
            i32::from(velocity),
            0,
            127,
        )),
        MidiMessage::NoteOff { note, .. } => Some(MidiEvent::new(
            device,
            format!("Note {}", note_name(note)),
            0,
            0,
            127,
        )),
        MidiMessage::PitchBend { channel, value } => Some(MidiEvent::new(
            device,
            format!("Pitch {}", channel + 1),
            i32::from(value),
            0,
            PITCH_BEND_MAX,
        )),
        _ => None,
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick a port by name; indices shift when devices are hot-plugged
fn find_port<P>(
    ports: Vec<P>,
    name_of: impl Fn(&P) -> Option<String>,
    wanted: &str,
) -> Option<P> {
    ports
        .into_iter()
        .find(|port| name_of(port).is_some_and(|name| name == wanted))
}

#[derive(Debug, Error)]
pub enum MidiSourceError {
    #[error("MIDI initialization failed: {0}")]
    Init(#[from] midir::InitError),
    #[error("failed to connect to MIDI port {port}: {reason}")]
    Connect { port: String, reason: String },
    #[error("no MIDI input port matches: {0}")]
    PortNotFound(String),
}

pub type MidiHandler = Arc<dyn Fn(MidiEvent) + Send + Sync>;

/// Something that delivers MIDI events to subscribers
pub trait MidiSource {
    fn device_count(&self) -> usize;

    /// Input device names
    fn devices(&self) -> Vec<String>;

    /// Start delivering events to `handler`; returns the number of devices listened to
    fn subscribe(&self, handler: MidiHandler) -> Result<usize, MidiSourceError>;
}

/// Input ports opened through midir, one callback thread per port
pub struct MidirSource {
    client_name: String,
    /// Case-insensitive substrings; empty means every port
    patterns: Vec<String>,
    connections: Mutex<Vec<MidiInputConnection<()>>>,
}

impl MidirSource {
    pub fn new(client_name: impl Into<String>, patterns: Vec<String>) -> Self {
        Self {
            client_name: client_name.into(),
            patterns,
            connections: Mutex::new(Vec::new()),
        }
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| name.contains(&pattern.to_lowercase()))
    }

    fn port_names(&self) -> Result<Vec<String>, MidiSourceError> {
        let midi_in = MidiInput::new(&format!("{}-discovery", self.client_name))?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }

    fn connect(&self, index: usize, port_name: &str, handler: MidiHandler) -> Result<(), MidiSourceError> {
        let mut midi_in = MidiInput::new(&format!("{}-{}", self.client_name, index))?;
        midi_in.ignore(Ignore::All);

        let port = find_port(midi_in.ports(), |port| midi_in.port_name(port).ok(), port_name)
            .ok_or_else(|| MidiSourceError::PortNotFound(port_name.to_string()))?;

        let device = port_name.to_string();
        let connection = midi_in
            .connect(
                &port,
                &self.client_name,
                move |_timestamp, data, _| {
                    let event = MidiMessage::parse(data)
                        .and_then(|message| to_midi_event(&device, &message));
                    match event {
                        Some(event) => handler(event),
                        None => trace!("{}: ignored MIDI {}", device, format_hex(data)),
                    }
                },
                (),
            )
            .map_err(|e| MidiSourceError::Connect {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Listening to MIDI input: {}", port_name);
        self.connections.lock().push(connection);
        Ok(())
    }
}

impl MidiSource for MidirSource {
    fn device_count(&self) -> usize {
        self.devices().len()
    }

    fn devices(&self) -> Vec<String> {
        match self.port_names() {
            Ok(names) => names,
            Err(e) => {
                warn!("Cannot enumerate MIDI inputs: {}", e);
                Vec::new()
            }
        }
    }

    fn subscribe(&self, handler: MidiHandler) -> Result<usize, MidiSourceError> {
        let mut connected = 0;
        for (index, name) in self.port_names()?.iter().enumerate() {
            if !self.matches(name) {
                debug!("Skipping MIDI input: {}", name);
                continue;
            }
            match self.connect(index, name, Arc::clone(&handler)) {
                Ok(()) => connected += 1,
                Err(e) => warn!("{}", e),
            }
        }

        if connected == 0 && !self.patterns.is_empty() {
            return Err(MidiSourceError::PortNotFound(self.patterns.join(", ")));
        }
        Ok(connected)
    }
}

/// In-process source; events passed to `send` reach every subscriber
#[derive(Default)]
pub struct LoopbackSource {
    devices: Vec<String>,
    handlers: Mutex<Vec<MidiHandler>>,
}

impl LoopbackSource {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn send(&self, event: MidiEvent) {
        let handlers: Vec<MidiHandler> = self.handlers.lock().clone();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Parse and deliver raw bytes as if received on `device`
    pub fn send_raw(&self, device: &str, data: &[u8]) -> bool {
        match MidiMessage::parse(data).and_then(|message| to_midi_event(device, &message)) {
            Some(event) => {
                self.send(event);
                true
            }
            None => false,
        }
    }
}

impl MidiSource for LoopbackSource {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn devices(&self) -> Vec<String> {
        self.devices.clone()
    }

    fn subscribe(&self, handler: MidiHandler) -> Result<usize, MidiSourceError> {
        self.handlers.lock().push(handler);
        Ok(self.devices.len())
    }
}
