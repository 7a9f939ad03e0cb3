//! Torrent identity collaborators consumed by the announce engine

pub mod metadata;
pub mod passkey;
pub mod signature;

use std::fmt;

pub use metadata::TorrentMetadata;
pub use passkey::extract_passkey;
pub use signature::{ClientProfile, ClientSignature};

use crate::bencode::BencodeError;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40-character hex string.
    ///
    /// # Errors
    /// - `MetadataError::InvalidInfoHash` - Not 40 hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, MetadataError> {
        let bytes = hex::decode(hex_str).map_err(|_| MetadataError::InvalidInfoHash {
            value: hex_str.to_string(),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| MetadataError::InvalidInfoHash {
                value: hex_str.to_string(),
            })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// 20-byte peer identifier sent to trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Builds a peer id from arbitrary bytes.
    ///
    /// # Errors
    /// - `MetadataError::InvalidPeerId` - Input is not exactly 20 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MetadataError> {
        let id: [u8; 20] = bytes
            .try_into()
            .map_err(|_| MetadataError::InvalidPeerId {
                length: bytes.len(),
            })?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Errors raised while loading torrent metadata or client identity.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("Torrent file is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("Malformed bencode")]
    Bencode(#[from] BencodeError),

    #[error("Invalid announce URL {url}: {reason}")]
    InvalidAnnounceUrl { url: String, reason: String },

    #[error("Unsupported tracker scheme '{scheme}', only http is supported")]
    UnsupportedScheme { scheme: String },

    #[error("Invalid info hash '{value}'")]
    InvalidInfoHash { value: String },

    #[error("Peer id must be 20 bytes, got {length}")]
    InvalidPeerId { length: usize },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
