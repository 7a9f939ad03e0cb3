//! Announce request construction
//!
//! Accumulates session state and identity, validates it, and renders the
//! request target (`path?query`) sent on the GET line.

use std::fmt;

use super::AnnounceError;
use super::query::{build_ordered_query, percent_encode_bytes};
use super::types::AnnounceEvent;
use crate::torrent::TorrentMetadata;

const HASH_LENGTH: usize = 20;
const DEFAULT_NUMWANT: u32 = 10;

/// A fully built announce request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    /// Announce path, with the passkey inserted when required
    pub path: String,
    /// Ordered query string without the leading `?`
    pub query: String,
}

impl AnnounceRequest {
    /// Request target as written on the HTTP request line.
    pub fn target(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnnounceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query)
        }
    }
}

/// Fluent builder for announce requests.
///
/// Required: info hash, peer id, port and transfer stats. Everything else is
/// optional and omitted from the query when unset.
#[derive(Debug, Clone)]
pub struct AnnounceRequestBuilder {
    path: String,
    info_hash: Option<Vec<u8>>,
    peer_id: Option<Vec<u8>>,
    port: Option<u16>,
    stats: Option<(u64, u64, u64)>,
    numwant: u32,
    event: Option<AnnounceEvent>,
    key: Option<String>,
    tracker_id: Option<String>,
    ip: Option<String>,
    ipv6: Option<String>,
    passkey: Option<String>,
    extra: Vec<(String, String)>,
}

impl AnnounceRequestBuilder {
    /// Starts a request for the given announce path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            info_hash: None,
            peer_id: None,
            port: None,
            stats: None,
            numwant: DEFAULT_NUMWANT,
            event: None,
            key: None,
            tracker_id: None,
            ip: None,
            ipv6: None,
            passkey: None,
            extra: Vec::new(),
        }
    }

    /// Starts a request from torrent metadata: path, info hash, passkey and
    /// any query parameters that were part of the announce URL.
    pub fn for_torrent(metadata: &TorrentMetadata) -> Self {
        let mut builder = Self::new(metadata.announce_path.clone())
            .info_hash(metadata.info_hash.as_bytes());
        builder.extra = metadata.announce_query.clone();
        if let Some(passkey) = &metadata.passkey {
            builder = builder.passkey(passkey.clone());
        }
        builder
    }

    pub fn info_hash(mut self, info_hash: &[u8]) -> Self {
        self.info_hash = Some(info_hash.to_vec());
        self
    }

    pub fn peer_id(mut self, peer_id: &[u8]) -> Self {
        self.peer_id = Some(peer_id.to_vec());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the transfer counters reported to the tracker.
    pub fn stats(mut self, uploaded: u64, downloaded: u64, left: u64) -> Self {
        self.stats = Some((uploaded, downloaded, left));
        self
    }

    pub fn numwant(mut self, numwant: u32) -> Self {
        self.numwant = numwant;
        self
    }

    /// Sets the announce event. Leaving it unset omits `event` entirely.
    pub fn event(mut self, event: AnnounceEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn tracker_id(mut self, tracker_id: impl Into<String>) -> Self {
        self.tracker_id = Some(tracker_id.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn ipv6(mut self, ipv6: impl Into<String>) -> Self {
        self.ipv6 = Some(ipv6.into());
        self
    }

    pub fn passkey(mut self, passkey: impl Into<String>) -> Self {
        self.passkey = Some(passkey.into());
        self
    }

    /// Appends a raw `a=b&c=d` query fragment after the canonical parameters.
    ///
    /// Values are taken verbatim; a leading `?` is ignored.
    pub fn extra_query(mut self, query: &str) -> Self {
        let query = query.trim_start_matches('?');
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            self.extra.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// Appends a single extra parameter.
    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Validates the accumulated fields and renders the request.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::Validation` - Required field missing, hash or peer id
    ///   not exactly 20 bytes, or port zero
    pub fn build(&self) -> Result<AnnounceRequest, AnnounceError> {
        let info_hash = require_hash("info_hash", self.info_hash.as_deref())?;
        let peer_id = require_hash("peer_id", self.peer_id.as_deref())?;
        let port = match self.port {
            Some(0) => return Err(validation("port must be in 1..=65535")),
            Some(port) => port,
            None => return Err(validation("port is required")),
        };
        let (uploaded, downloaded, left) = self
            .stats
            .ok_or_else(|| validation("uploaded/downloaded/left are required"))?;

        let mut fields: Vec<(&str, String)> = vec![
            ("info_hash", percent_encode_bytes(info_hash)),
            ("peer_id", percent_encode_bytes(peer_id)),
            ("port", port.to_string()),
            ("uploaded", uploaded.to_string()),
            ("downloaded", downloaded.to_string()),
            ("left", left.to_string()),
            ("compact", "1".to_string()),
            ("numwant", self.numwant.to_string()),
            ("supportcrypto", "1".to_string()),
            ("no_peer_id", "1".to_string()),
        ];

        if let Some(event) = self.event {
            fields.push(("event", event.as_str().to_string()));
        }
        let optional = [
            ("key", &self.key),
            ("trackerid", &self.tracker_id),
            ("ip", &self.ip),
            ("ipv6", &self.ipv6),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                fields.push((name, value.clone()));
            }
        }

        let path = match &self.passkey {
            Some(passkey) => insert_passkey(&self.path, passkey),
            None => self.path.clone(),
        };

        Ok(AnnounceRequest {
            path,
            query: build_ordered_query(fields, &self.extra),
        })
    }
}

/// Inserts `passkey` as a path segment before the `announce` segment.
///
/// The path is returned unchanged when it has no `announce` segment or
/// already contains the passkey (compared case-insensitively).
pub fn insert_passkey(path: &str, passkey: &str) -> String {
    let passkey = passkey.trim_matches('/');
    if passkey.is_empty() || path.to_lowercase().contains(&passkey.to_lowercase()) {
        return path.to_string();
    }

    let segments: Vec<&str> = path.split('/').collect();
    let Some(position) = segments
        .iter()
        .position(|segment| segment.eq_ignore_ascii_case("announce"))
    else {
        return path.to_string();
    };

    let mut rebuilt: Vec<&str> = Vec::with_capacity(segments.len() + 1);
    rebuilt.extend_from_slice(&segments[..position]);
    rebuilt.push(passkey);
    rebuilt.extend_from_slice(&segments[position..]);
    rebuilt.join("/")
}

fn require_hash<'a>(name: &str, value: Option<&'a [u8]>) -> Result<&'a [u8], AnnounceError> {
    match value {
        Some(bytes) if bytes.len() == HASH_LENGTH => Ok(bytes),
        Some(bytes) => Err(validation(format!(
            "{name} must be {HASH_LENGTH} bytes, got {}",
            bytes.len()
        ))),
        None => Err(validation(format!("{name} is required"))),
    }
}

fn validation(reason: impl Into<String>) -> AnnounceError {
    AnnounceError::Validation {
        reason: reason.into(),
    }
}
