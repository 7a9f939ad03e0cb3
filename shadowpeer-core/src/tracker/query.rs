//! Query string encoding with a fixed parameter order
//!
//! Some private trackers sign or compare the raw query string, so parameters
//! are always emitted in the same order no matter how they were supplied.

use std::fmt::Write;

/// Canonical announce parameter order. Extra parameters follow these.
pub const CANONICAL_KEYS: [&str; 15] = [
    "info_hash",
    "peer_id",
    "port",
    "uploaded",
    "downloaded",
    "left",
    "event",
    "key",
    "compact",
    "numwant",
    "supportcrypto",
    "no_peer_id",
    "trackerid",
    "ip",
    "ipv6",
];

/// Percent-encodes every byte as `%XX` with uppercase hex digits.
///
/// Meant for raw 20-byte values (`info_hash`, `peer_id`). Unreserved
/// characters are encoded too, so the output is always three times the input.
pub fn percent_encode_bytes(data: &[u8]) -> String {
    let mut encoded = String::with_capacity(data.len() * 3);
    for byte in data {
        // Writing to a String cannot fail
        let _ = write!(encoded, "%{byte:02X}");
    }
    encoded
}

/// Builds `key=value&...` with canonical keys first, in [`CANONICAL_KEYS`] order.
///
/// `fields` may arrive in any order; when a key repeats, the last value wins.
/// Non-canonical keys in `fields` follow the canonical block in first-seen
/// order, then `extra` in the order supplied. An `extra` entry whose key is
/// canonical replaces that canonical value in place.
///
/// Blank values are dropped, except `event` set to the empty string, which is
/// emitted as `event=`.
pub fn build_ordered_query<'a, I>(fields: I, extra: &[(String, String)]) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut canonical: [Option<String>; CANONICAL_KEYS.len()] = Default::default();
    let mut trailing: Vec<(String, String)> = Vec::new();

    let supplied = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .chain(extra.iter().cloned());

    for (key, value) in supplied {
        match CANONICAL_KEYS.iter().position(|candidate| *candidate == key) {
            Some(index) => canonical[index] = Some(value),
            None => match trailing.iter_mut().find(|(existing, _)| *existing == key) {
                Some(entry) => entry.1 = value,
                None => trailing.push((key, value)),
            },
        }
    }

    let ordered = CANONICAL_KEYS
        .iter()
        .zip(canonical)
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .chain(trailing);

    let mut query = String::new();
    for (key, value) in ordered {
        let explicit_empty_event = key == "event" && value.is_empty();
        if value.trim().is_empty() && !explicit_empty_event {
            continue;
        }
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&key);
        query.push('=');
        query.push_str(&value);
    }
    query
}
