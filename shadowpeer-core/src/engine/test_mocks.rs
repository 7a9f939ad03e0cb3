//! Mock implementations for testing the announce engine.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bip_bencode::{ben_int, ben_map};
use tokio::sync::Mutex;

use crate::torrent::{ClientProfile, ClientSignature, InfoHash, TorrentMetadata};
use crate::tracker::{AnnounceError, AnnounceTransport};

/// Interval used when no scripted reply is queued.
const DEFAULT_MOCK_INTERVAL: i64 = 1800;

/// One request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedAnnounce {
    pub host: String,
    pub port: u16,
    pub target: String,
    pub user_agent: String,
}

/// Transport that replays scripted replies and records every request.
///
/// Clones share state, so a test keeps one clone for inspection while the
/// engine owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<VecDeque<Result<Vec<u8>, AnnounceError>>>>,
    requests: Arc<Mutex<Vec<RecordedAnnounce>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw reply (headers + body).
    pub async fn push_response(&self, raw: Vec<u8>) {
        self.replies.lock().await.push_back(Ok(raw));
    }

    /// Queues a transport failure.
    pub async fn push_error(&self, error: AnnounceError) {
        self.replies.lock().await.push_back(Err(error));
    }

    pub async fn requests(&self) -> Vec<RecordedAnnounce> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl AnnounceTransport for MockTransport {
    async fn send_announce(
        &self,
        host: &str,
        port: u16,
        request_target: &str,
        user_agent: &str,
    ) -> Result<Vec<u8>, AnnounceError> {
        self.requests.lock().await.push(RecordedAnnounce {
            host: host.to_string(),
            port,
            target: request_target.to_string(),
            user_agent: user_agent.to_string(),
        });

        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(interval_response(DEFAULT_MOCK_INTERVAL)))
    }
}

/// HTTP reply with small swarm counts and the given `interval`.
pub fn interval_response(seconds: i64) -> Vec<u8> {
    let body = ben_map! {
        "complete" => ben_int!(3),
        "incomplete" => ben_int!(1),
        "interval" => ben_int!(seconds)
    }
    .encode();
    let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n".to_vec();
    raw.extend_from_slice(&body);
    raw
}

pub fn test_metadata() -> TorrentMetadata {
    TorrentMetadata {
        name: "test.iso".to_string(),
        total_size: 1024 * 1024,
        info_hash: InfoHash::new([0x11; 20]),
        announce_url: "http://tracker.example.com/announce".to_string(),
        tracker_host: "tracker.example.com".to_string(),
        tracker_port: 80,
        announce_path: "/announce".to_string(),
        announce_query: Vec::new(),
        passkey: None,
        comment: None,
        created_by: None,
        creation_date: None,
    }
}

pub fn test_signature() -> ClientSignature {
    ClientSignature::emulate(ClientProfile::ShadowPeer)
}
