//! `.torrent` metadata needed for announcing

use std::path::Path;

use sha1::{Digest, Sha1};
use url::Url;

use super::{InfoHash, MetadataError, passkey};
use crate::bencode::{BencodeValue, dictionary_entry_span};

const DEFAULT_NAME: &str = "Unnamed Torrent";

/// Torrent identity and tracker location.
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    pub name: String,
    /// Sum of all file lengths in bytes
    pub total_size: u64,
    pub info_hash: InfoHash,
    /// Primary announce URL as found in the torrent
    pub announce_url: String,
    pub tracker_host: String,
    pub tracker_port: u16,
    pub announce_path: String,
    /// Query parameters already present on the announce URL, raw
    pub announce_query: Vec<(String, String)>,
    /// Passkey inserted into the announce path at request time
    pub passkey: Option<String>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    /// Creation time as a Unix timestamp
    pub creation_date: Option<i64>,
}

impl TorrentMetadata {
    /// Parses a `.torrent` file from disk.
    ///
    /// # Errors
    /// - `MetadataError::Io` - File cannot be read
    /// - See [`TorrentMetadata::from_torrent_bytes`]
    pub fn from_file(path: &Path) -> Result<Self, MetadataError> {
        let data = std::fs::read(path)?;
        Self::from_torrent_bytes(&data)
    }

    /// Parses bencoded torrent data.
    ///
    /// The info hash is the SHA-1 of the `info` dictionary bytes exactly as
    /// they appear in `data`.
    ///
    /// # Errors
    /// - `MetadataError::Bencode` - Data is not valid bencode
    /// - `MetadataError::MissingField` - No `info`, size or announce URL
    /// - `MetadataError::InvalidAnnounceUrl` / `UnsupportedScheme` - Unusable tracker URL
    pub fn from_torrent_bytes(data: &[u8]) -> Result<Self, MetadataError> {
        let root = BencodeValue::decode(data)?;
        let info = match root.get("info") {
            Some(info @ BencodeValue::Dict(_)) => info,
            _ => return Err(MetadataError::MissingField { field: "info" }),
        };
        let info_bytes = dictionary_entry_span(data, b"info")?
            .ok_or(MetadataError::MissingField { field: "info" })?;
        let info_hash = InfoHash::new(Sha1::digest(info_bytes).into());

        let name = info
            .get("name")
            .and_then(BencodeValue::as_text)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());

        let total_size = total_size(info)?;
        let announce_url = primary_announce_url(&root)
            .ok_or(MetadataError::MissingField { field: "announce" })?;

        let metadata = Self {
            name,
            total_size,
            info_hash,
            announce_url: String::new(),
            tracker_host: String::new(),
            tracker_port: 0,
            announce_path: String::new(),
            announce_query: Vec::new(),
            passkey: None,
            comment: root.get("comment").and_then(BencodeValue::as_text),
            created_by: root.get("created by").and_then(BencodeValue::as_text),
            creation_date: root.get("creation date").and_then(BencodeValue::as_integer),
        }
        .with_announce_url(&announce_url)?;

        tracing::debug!(
            "Loaded torrent '{}' ({} bytes, info hash {})",
            metadata.name,
            metadata.total_size,
            metadata.info_hash
        );
        Ok(metadata)
    }

    /// Points the metadata at a different announce URL.
    ///
    /// Only `http` is accepted; the port defaults to 80.
    ///
    /// # Errors
    /// - `MetadataError::InvalidAnnounceUrl` - URL does not parse or has no host
    /// - `MetadataError::UnsupportedScheme` - Scheme other than `http`
    pub fn with_announce_url(mut self, announce_url: &str) -> Result<Self, MetadataError> {
        let invalid = |reason: String| MetadataError::InvalidAnnounceUrl {
            url: announce_url.to_string(),
            reason,
        };

        let url = Url::parse(announce_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(MetadataError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            });
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;

        self.tracker_host = host.to_string();
        self.tracker_port = url.port_or_known_default().unwrap_or(80);
        self.announce_path = url.path().to_string();
        self.announce_query = url
            .query()
            .map(split_raw_query)
            .unwrap_or_default();
        self.announce_url = announce_url.trim().to_string();
        Ok(self)
    }

    /// Sets the passkey to insert into the announce path.
    pub fn with_passkey(mut self, passkey: impl Into<String>) -> Self {
        let passkey = passkey.into();
        self.passkey = (!passkey.trim().is_empty()).then_some(passkey);
        self
    }

    /// Passkey embedded in the announce URL, if any.
    pub fn discovered_passkey(&self) -> Option<String> {
        passkey::extract_passkey(&self.announce_url)
    }
}

fn total_size(info: &BencodeValue) -> Result<u64, MetadataError> {
    if let Some(length) = info.get("length").and_then(BencodeValue::as_integer) {
        return u64::try_from(length).map_err(|_| MetadataError::InvalidTorrentFile {
            reason: format!("negative length {length}"),
        });
    }

    let files = info
        .get("files")
        .and_then(BencodeValue::as_list)
        .ok_or(MetadataError::MissingField { field: "length" })?;

    files.iter().try_fold(0u64, |total, file| {
        let length = file
            .get("length")
            .and_then(BencodeValue::as_integer)
            .and_then(|length| u64::try_from(length).ok())
            .ok_or_else(|| MetadataError::InvalidTorrentFile {
                reason: "file entry without a valid length".to_string(),
            })?;
        Ok(total.saturating_add(length))
    })
}

/// `announce`, falling back to the first URL of the first non-empty `announce-list` tier.
fn primary_announce_url(root: &BencodeValue) -> Option<String> {
    root.get("announce")
        .and_then(BencodeValue::as_text)
        .filter(|url| !url.trim().is_empty())
        .or_else(|| {
            root.get("announce-list")?
                .as_list()?
                .iter()
                .filter_map(BencodeValue::as_list)
                .find_map(|tier| tier.first().and_then(BencodeValue::as_text))
        })
}

fn split_raw_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.to_string(), value.to_string())
        })
        .collect()
}
