//! Command store and matcher
//!
//! The store keeps two tables keyed by `CommandKey`:
//! - bound commands, many per key, matched by value range in insertion order
//! - unbound (learned) commands, one per key, last write wins
//!
//! The matcher resolves incoming MIDI events against the bound table.

pub mod matcher;
pub mod persistence;
mod store;

pub use matcher::resolve;
pub use persistence::{
    CommandRepository, JsonFileRepository, MemoryRepository, PersistenceError, SledRepository,
};
pub use store::{CommandStore, CommandsChanged};
