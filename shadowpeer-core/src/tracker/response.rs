//! Tracker response decoding
//!
//! Splits the raw HTTP reply at the header terminator and decodes the
//! bencoded body. Peer lists come in compact (6 bytes per peer) or
//! dictionary form; both are accepted.

use std::net::{Ipv4Addr, SocketAddrV4};

use super::AnnounceError;
use super::types::{Peer, PeerList, TrackerResponse};
use crate::bencode::BencodeValue;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const COMPACT_PEER_LENGTH: usize = 6;

/// Decodes a raw tracker reply (headers + bencoded body).
///
/// Headers are only inspected for chunked transfer encoding; the status line
/// is not interpreted since trackers report errors in the body.
///
/// # Errors
///
/// - `AnnounceError::MalformedResponse` - No header terminator, body is not a
///   bencoded dictionary, or a chunked body is truncated
pub fn decode_tracker_response(raw: &[u8]) -> Result<TrackerResponse, AnnounceError> {
    let split = find_subsequence(raw, HEADER_TERMINATOR)
        .ok_or_else(|| malformed("missing header terminator"))?;
    let headers = &raw[..split];
    let body = &raw[split + HEADER_TERMINATOR.len()..];

    let body = if is_chunked(headers) {
        dechunk(body)?
    } else {
        body.to_vec()
    };

    // Some trackers append a newline or padding after the dictionary
    let root = BencodeValue::decode_leading(&body)
        .map_err(|e| malformed(format!("invalid bencode: {e}")))?;

    let BencodeValue::Dict(_) = root else {
        return Err(malformed("body is not a dictionary"));
    };

    let integer = |key: &str| root.get(key).and_then(BencodeValue::as_integer);
    let text = |key: &str| root.get(key).and_then(BencodeValue::as_text);

    let response = TrackerResponse {
        seeders: integer("complete"),
        leechers: integer("incomplete"),
        interval: integer("interval"),
        min_interval: integer("min interval"),
        peers: root.get("peers").and_then(decode_peers_field),
        tracker_id: text("tracker id"),
        warning_message: text("warning message"),
        failure_reason: text("failure reason"),
    };

    tracing::debug!(
        "Decoded tracker response: seeders={:?} leechers={:?} interval={:?} peers={}",
        response.seeders,
        response.leechers,
        response.interval,
        response.peer_count()
    );

    Ok(response)
}

/// Decodes a compact peer blob, whole 6-byte entries only.
///
/// A trailing partial entry is ignored and logged.
pub fn decode_compact_peers(bytes: &[u8]) -> Vec<Peer> {
    let remainder = bytes.len() % COMPACT_PEER_LENGTH;
    if remainder != 0 {
        tracing::warn!(
            "Compact peer list length {} is not a multiple of {}, ignoring {} trailing bytes",
            bytes.len(),
            COMPACT_PEER_LENGTH,
            remainder
        );
    }

    bytes
        .chunks_exact(COMPACT_PEER_LENGTH)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            Peer::from(SocketAddrV4::new(ip, port))
        })
        .collect()
}

fn decode_peers_field(value: &BencodeValue) -> Option<PeerList> {
    match value {
        BencodeValue::Bytes(bytes) => {
            if bytes.len() % COMPACT_PEER_LENGTH != 0 {
                tracing::warn!(
                    "Compact peer list has {} bytes, decoding whole entries only",
                    bytes.len()
                );
            }
            Some(PeerList::Compact(bytes.clone()))
        }
        BencodeValue::List(entries) => {
            let peers = entries
                .iter()
                .enumerate()
                .filter_map(|(index, entry)| {
                    let peer = decode_peer_entry(entry);
                    if peer.is_none() {
                        tracing::warn!("Skipping malformed peer entry {index}");
                    }
                    peer
                })
                .collect();
            Some(PeerList::Dictionary(peers))
        }
        _ => {
            tracing::warn!("Ignoring peers field of unexpected type");
            None
        }
    }
}

fn decode_peer_entry(entry: &BencodeValue) -> Option<Peer> {
    let ip = entry.get("ip")?.as_text()?;
    let port = entry.get("port")?.as_integer()?;
    let port = u16::try_from(port).ok()?;
    Some(Peer { ip, port })
}

fn is_chunked(headers: &[u8]) -> bool {
    String::from_utf8_lossy(headers).lines().any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("transfer-encoding")
                && value.to_ascii_lowercase().contains("chunked")
        })
    })
}

fn dechunk(mut body: &[u8]) -> Result<Vec<u8>, AnnounceError> {
    let mut decoded = Vec::with_capacity(body.len());
    loop {
        let line_end =
            find_subsequence(body, b"\r\n").ok_or_else(|| malformed("truncated chunk header"))?;
        let size_line = String::from_utf8_lossy(&body[..line_end]);
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| malformed(format!("invalid chunk size {size_text:?}")))?;
        body = &body[line_end + 2..];

        if size == 0 {
            return Ok(decoded);
        }
        if body.len() < size {
            return Err(malformed("truncated chunk body"));
        }
        decoded.extend_from_slice(&body[..size]);
        body = body[size..].strip_prefix(b"\r\n").unwrap_or(&body[size..]);
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn malformed(reason: impl Into<String>) -> AnnounceError {
    AnnounceError::MalformedResponse {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use bip_bencode::{BMutAccess, ben_bytes, ben_int, ben_list, ben_map};
    use proptest::prelude::*;

    use super::*;

    fn http(body: &[u8]) -> Vec<u8> {
        let mut raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n".to_vec();
        raw.extend_from_slice(body);
        raw
    }

    #[test]
    fn test_decode_compact_response() {
        let raw = http(b"d8:completei5e10:incompletei2e8:intervali1800e5:peers12:AAAABBCCCCDDe");
        let response = decode_tracker_response(&raw).unwrap();

        assert_eq!(response.seeders, Some(5));
        assert_eq!(response.leechers, Some(2));
        assert_eq!(response.interval, Some(1800));
        assert_eq!(response.min_interval, None);

        let peers = response.peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].ip, "65.65.65.65");
        assert_eq!(peers[0].port, 0x4242);
        assert_eq!(peers[1].ip, "67.67.67.67");
        assert_eq!(peers[1].port, 0x4444);
    }

    #[test]
    fn test_decode_dictionary_peers_skips_malformed_entries() {
        let mut peers = ben_list!();
        let peers_mut = peers.list_mut().unwrap();
        peers_mut.push(ben_map! {
            "ip" => ben_bytes!("10.0.0.1"),
            "port" => ben_int!(6881)
        });
        peers_mut.push(ben_map! {
            "ip" => ben_bytes!("10.0.0.2")
        });
        peers_mut.push(ben_map! {
            "ip" => ben_bytes!("10.0.0.3"),
            "port" => ben_int!(70000)
        });
        peers_mut.push(ben_int!(1));
        let body = ben_map! {
            "interval" => ben_int!(900),
            "min interval" => ben_int!(300),
            "peers" => peers
        }
        .encode();

        let response = decode_tracker_response(&http(&body)).unwrap();
        assert_eq!(response.min_interval, Some(300));
        assert_eq!(
            response.peers,
            Some(PeerList::Dictionary(vec![Peer {
                ip: "10.0.0.1".to_string(),
                port: 6881
            }]))
        );
    }

    #[test]
    fn test_missing_peers_is_empty_swarm() {
        let response = decode_tracker_response(&http(b"d8:intervali60ee")).unwrap();
        assert_eq!(response.peers, None);
        assert!(response.peers().is_empty());
    }

    #[test]
    fn test_failure_warning_and_tracker_id_captured() {
        let body = b"d14:failure reason12:unregistered10:tracker id3:abc15:warning message4:slowe";
        let response = decode_tracker_response(&http(body)).unwrap();
        assert_eq!(response.failure_reason.as_deref(), Some("unregistered"));
        assert_eq!(response.warning_message.as_deref(), Some("slow"));
        assert_eq!(response.tracker_id.as_deref(), Some("abc"));
        assert_eq!(response.interval, None);
    }

    #[test]
    fn test_malformed_inputs() {
        let no_terminator = decode_tracker_response(b"HTTP/1.1 200 OK\r\nd8:intervali1ee");
        assert!(matches!(no_terminator, Err(AnnounceError::MalformedResponse { .. })));

        let not_bencode = decode_tracker_response(&http(b"<html>nope</html>"));
        assert!(matches!(not_bencode, Err(AnnounceError::MalformedResponse { .. })));

        let not_dict = decode_tracker_response(&http(b"li1ee"));
        assert!(matches!(not_dict, Err(AnnounceError::MalformedResponse { .. })));

        let truncated = decode_tracker_response(&http(b"d8:intervali1800e"));
        assert!(matches!(truncated, Err(AnnounceError::MalformedResponse { .. })));
    }

    #[test]
    fn test_trailing_bytes_after_body_are_tolerated() {
        let response = decode_tracker_response(&http(b"d8:intervali60ee\n")).unwrap();
        assert_eq!(response.interval, Some(60));
    }

    #[test]
    fn test_chunked_body_is_reassembled() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                    6\r\nd8:int\r\na\r\nervali60ee\r\n0\r\n\r\n";
        let response = decode_tracker_response(raw).unwrap();
        assert_eq!(response.interval, Some(60));
    }

    #[test]
    fn test_compact_peers_ignore_partial_entry() {
        let peers = decode_compact_peers(&[127, 0, 0, 1, 0x1A, 0xE1, 9, 9, 9]);
        assert_eq!(
            peers,
            vec![Peer {
                ip: "127.0.0.1".to_string(),
                port: 6881
            }]
        );
    }

    proptest! {
        #[test]
        fn prop_compact_peers_round_trip(
            addresses in proptest::collection::vec((any::<[u8; 4]>(), any::<u16>()), 0..50)
        ) {
            let peers: Vec<Peer> = addresses
                .iter()
                .map(|(octets, port)| Peer::from(SocketAddrV4::new(Ipv4Addr::from(*octets), *port)))
                .collect();
            let packed: Vec<u8> = peers
                .iter()
                .flat_map(|peer| peer.to_compact().unwrap())
                .collect();

            prop_assert_eq!(packed.len(), peers.len() * 6);
            prop_assert_eq!(decode_compact_peers(&packed), peers);
        }
    }
}
