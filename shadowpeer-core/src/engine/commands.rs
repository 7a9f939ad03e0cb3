//! Command definitions and shared state types for the announce engine actor.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::tracker::{AnnounceError, TrackerResponse};

/// Lifecycle state of an announce session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Created or reset, nothing announced yet
    Ready,
    /// First announce in flight
    Starting,
    /// Periodic heartbeats active
    Running,
    /// Session ended by a stop
    Stopped,
    /// Session ended by an announce failure
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Ready => "ready",
            EngineState::Starting => "starting",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
            EngineState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Session progress owned by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Simulated bytes uploaded this session
    pub uploaded_bytes: u64,
    /// `uploaded_bytes` at the last successful announce
    pub last_announced_bytes: u64,
    /// Time since the last successful announce
    pub elapsed: Duration,
    /// Time until the next scheduled heartbeat
    pub next_announce_in: Duration,
}

/// Point-in-time view of the engine for front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub counters: SessionCounters,
    /// Last sampled upload speed in bytes per second
    pub current_speed: u64,
    pub upload_target_reached: bool,
    /// Re-announce interval currently in effect
    pub tracker_interval: Duration,
    pub last_response: Option<TrackerResponse>,
    pub last_error: Option<String>,
    /// Announces that got a reply from the tracker
    pub announces_sent: u64,
}

/// Commands that can be sent to the announce engine actor.
///
/// Each command carries a response channel; the actor applies commands one
/// at a time between ticks, so no engine field is ever shared.
pub enum AnnounceEngineCommand {
    /// Send the `started` announce and begin heartbeats.
    Start {
        responder: oneshot::Sender<Result<(), AnnounceError>>,
    },
    /// Heartbeat immediately and restart the interval timer.
    ForceHeartbeat {
        responder: oneshot::Sender<Result<(), AnnounceError>>,
    },
    /// Send the `stopped` announce and end the session.
    Stop {
        responder: oneshot::Sender<Result<(), AnnounceError>>,
    },
    /// Return a terminated session to `Ready`.
    Reset {
        responder: oneshot::Sender<Result<(), AnnounceError>>,
    },
    /// Get the current snapshot.
    GetSnapshot {
        responder: oneshot::Sender<EngineSnapshot>,
    },
    /// Take the error that ended the session from the tick loop, if any.
    TakeFailure {
        responder: oneshot::Sender<Option<AnnounceError>>,
    },
    /// Stop if running, then terminate the actor.
    Shutdown { responder: oneshot::Sender<()> },
}
