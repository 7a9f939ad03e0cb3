//! Core types for tracker announce communication

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::Serialize;

use super::response::decode_compact_peers;

/// Shortest re-announce interval the engine will schedule.
pub const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// BitTorrent announce events.
///
/// `Empty` sends the parameter with no value; leaving the event unset on the
/// builder omits the parameter entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnnounceEvent {
    /// First announce of a session
    Started,
    /// Client finished downloading
    Completed,
    /// Final announce of a session
    Stopped,
    /// Explicit `event=` with an empty value
    Empty,
}

impl AnnounceEvent {
    /// Convert announce event to tracker protocol string.
    pub fn as_str(self) -> &'static str {
        match self {
            AnnounceEvent::Started => "started",
            AnnounceEvent::Completed => "completed",
            AnnounceEvent::Stopped => "stopped",
            AnnounceEvent::Empty => "",
        }
    }
}

/// A peer address reported by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    /// Dotted-quad address (or whatever the tracker sent in dictionary format)
    pub ip: String,
    pub port: u16,
}

impl Peer {
    /// Packs the peer into the 6-byte compact layout.
    ///
    /// Returns `None` when the address is not IPv4.
    pub fn to_compact(&self) -> Option<[u8; 6]> {
        let ip: Ipv4Addr = self.ip.parse().ok()?;
        let mut packed = [0u8; 6];
        packed[..4].copy_from_slice(&ip.octets());
        packed[4..].copy_from_slice(&self.port.to_be_bytes());
        Some(packed)
    }
}

impl From<SocketAddrV4> for Peer {
    fn from(address: SocketAddrV4) -> Self {
        Self {
            ip: address.ip().to_string(),
            port: address.port(),
        }
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Peer list in whichever format the tracker used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PeerList {
    /// Raw compact blob, 6 bytes per peer
    Compact(Vec<u8>),
    /// Dictionary-format entries that decoded cleanly
    Dictionary(Vec<Peer>),
}

/// Tracker announce response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerResponse {
    /// Number of seeders in the swarm (`complete`)
    pub seeders: Option<i64>,
    /// Number of leechers in the swarm (`incomplete`)
    pub leechers: Option<i64>,
    /// Seconds until the next announce
    pub interval: Option<i64>,
    /// Minimum allowed seconds between announces
    pub min_interval: Option<i64>,
    /// Peers, absent when the tracker sent none
    pub peers: Option<PeerList>,
    /// Tracker-specific identifier to echo on later announces
    pub tracker_id: Option<String>,
    /// Non-fatal message from the tracker
    pub warning_message: Option<String>,
    /// Tracker refused the announce
    pub failure_reason: Option<String>,
}

impl TrackerResponse {
    /// Expands the peer list into addresses regardless of wire format.
    pub fn peers(&self) -> Vec<Peer> {
        match &self.peers {
            Some(PeerList::Compact(bytes)) => decode_compact_peers(bytes),
            Some(PeerList::Dictionary(peers)) => peers.clone(),
            None => Vec::new(),
        }
    }

    /// Number of whole peers in the response.
    pub fn peer_count(&self) -> usize {
        match &self.peers {
            Some(PeerList::Compact(bytes)) => bytes.len() / 6,
            Some(PeerList::Dictionary(peers)) => peers.len(),
            None => 0,
        }
    }

    /// Effective re-announce interval, honouring `min interval`.
    ///
    /// Returns `None` only when the tracker sent no interval. A zero or
    /// negative interval is raised to `min interval`, or to
    /// [`MIN_ANNOUNCE_INTERVAL`] when that is absent too.
    pub fn announce_interval(&self) -> Option<Duration> {
        let interval = self.interval?;
        let floor = self
            .min_interval
            .filter(|seconds| *seconds > 0)
            .map_or(MIN_ANNOUNCE_INTERVAL, |seconds| {
                Duration::from_secs(seconds as u64)
            });

        if interval <= 0 {
            tracing::warn!(
                "Tracker sent non-positive interval {}, using {:?}",
                interval,
                floor
            );
            return Some(floor);
        }
        Some(Duration::from_secs(interval as u64).max(floor))
    }
}
