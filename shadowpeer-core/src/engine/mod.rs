//! Announce engine built on the actor model.
//!
//! One task owns the engine and multiplexes external commands with the tick
//! interval; handles talk to it only through messages.

pub mod actor;
pub mod commands;
pub mod core;
pub mod handle;
#[cfg(test)]
mod test_mocks;

pub use actor::spawn_announce_engine;
pub use commands::{AnnounceEngineCommand, EngineSnapshot, EngineState, SessionCounters};
pub use self::core::AnnounceEngine;
pub use handle::AnnounceEngineHandle;
