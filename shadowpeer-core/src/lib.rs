//! ShadowPeer Core - BitTorrent tracker announce engine
//!
//! This crate drives the tracker announce lifecycle for a single torrent:
//! request building, raw TCP transport, bencoded response decoding, and a
//! scheduling engine fed by a synthetic upload traffic generator.

pub mod bencode;
pub mod config;
pub mod engine;
pub mod simulation;
pub mod torrent;
pub mod tracing_setup;
pub mod tracker;

// Re-export main types for convenient access
pub use config::ShadowpeerConfig;
pub use engine::{AnnounceEngineHandle, EngineSnapshot, EngineState, spawn_announce_engine};
pub use torrent::{ClientSignature, MetadataError, TorrentMetadata};
pub use tracker::{AnnounceError, TcpAnnounceTransport, TrackerResponse};

/// Top-level errors surfaced to front ends.
///
/// Wraps the subsystem errors so binaries can report a single error type.
#[derive(Debug, thiserror::Error)]
pub enum ShadowpeerError {
    #[error("Announce error: {0}")]
    Announce(#[from] AnnounceError),

    #[error("Torrent metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShadowpeerError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ShadowpeerError::Announce(e) => match e {
                AnnounceError::ConnectTimeout { address, .. } => {
                    format!("Tracker {address} did not accept the connection in time")
                }
                AnnounceError::Connect { address, .. } => {
                    format!("Could not connect to tracker {address}")
                }
                AnnounceError::TrackerRejected { reason } => {
                    format!("Tracker rejected the announce: {reason}")
                }
                AnnounceError::MissingInterval => {
                    "Tracker did not provide an announce interval".to_string()
                }
                AnnounceError::MalformedResponse { .. } => {
                    "Tracker sent a response that could not be decoded".to_string()
                }
                _ => "Announce failed".to_string(),
            },
            ShadowpeerError::Metadata(e) => format!("Invalid torrent: {e}"),
            ShadowpeerError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            ShadowpeerError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ShadowpeerError::Configuration { .. }
                | ShadowpeerError::Metadata(_)
                | ShadowpeerError::Announce(AnnounceError::Validation { .. })
                | ShadowpeerError::Announce(AnnounceError::InvalidConfiguration { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ShadowpeerError>;
