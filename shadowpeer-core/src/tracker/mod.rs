//! BitTorrent tracker announce protocol over raw TCP.
//!
//! Builds announce requests with a deterministic query order, sends them as
//! hand-written HTTP/1.1 GETs, and decodes the bencoded reply into a
//! structured response.

pub mod builder;
pub mod query;
pub mod response;
pub mod transport;
pub mod types;

use std::time::Duration;

// Re-export public API
pub use builder::{AnnounceRequest, AnnounceRequestBuilder};
pub use query::{CANONICAL_KEYS, build_ordered_query, percent_encode_bytes};
pub use response::{decode_compact_peers, decode_tracker_response};
pub use transport::{AnnounceTransport, TcpAnnounceTransport, format_http_request};
pub use types::{AnnounceEvent, MIN_ANNOUNCE_INTERVAL, Peer, PeerList, TrackerResponse};

use crate::engine::EngineState;

/// Errors that can occur while announcing to a tracker or driving the engine.
///
/// Transport and decode failures surface to the engine as announce failures;
/// lifecycle misuse surfaces as `InvalidState` or `EngineDisposed`.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("Invalid announce request: {reason}")]
    Validation { reason: String },

    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("Connection to {address} failed")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No response from {address} within {timeout:?}")]
    ReadTimeout { address: String, timeout: Duration },

    #[error("Tracker response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Malformed tracker response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Tracker rejected announce: {reason}")]
    TrackerRejected { reason: String },

    #[error("Tracker response did not include an announce interval")]
    MissingInterval,

    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Announce engine has been disposed")]
    EngineDisposed,
}

impl AnnounceError {
    /// Checks if this error came from the network round-trip.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            AnnounceError::ConnectTimeout { .. }
                | AnnounceError::Connect { .. }
                | AnnounceError::ReadTimeout { .. }
                | AnnounceError::ResponseTooLarge { .. }
                | AnnounceError::Io(_)
        )
    }

    /// Checks if this error is a lifecycle violation.
    ///
    /// A first announce without an interval counts as one: the engine cannot
    /// schedule and therefore cannot enter the running state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            AnnounceError::InvalidState { .. } | AnnounceError::MissingInterval
        )
    }
}
