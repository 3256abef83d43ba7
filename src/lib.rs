//! MIDI vJoy GW
//!
//! Binds MIDI controls to virtual joystick axes and buttons. MIDI events are
//! resolved against a persisted command table and fed to up to sixteen
//! virtual joystick devices.

pub mod commands;
pub mod config;
pub mod events;
pub mod joystick;
pub mod midi;
pub mod model;
pub mod paths;
pub mod tower;

pub use commands::CommandStore;
pub use joystick::JoyManager;
pub use tower::DispatchTower;
