//! Passkey discovery in private tracker URLs

use std::borrow::Cow;

use url::Url;

const PATH_IDENTIFIERS: [&str; 3] = ["announce", "announce.php", "scrape"];
const QUERY_KEYS: [&str; 4] = ["passkey", "key", "token", "auth"];

/// Finds the per-user passkey embedded in an announce URL.
///
/// Tried in order: the path segment before `announce`/`announce.php`/`scrape`,
/// the last path segment when it is not one of those, the query keys
/// `passkey`/`key`/`token`/`auth`, then the same keys inside the fragment.
pub fn extract_passkey(announce_url: &str) -> Option<String> {
    let url = Url::parse(announce_url.trim()).ok()?;

    let passkey = from_path(&url)
        .or_else(|| from_pairs(url.query_pairs()))
        .or_else(|| {
            url.fragment()
                .and_then(|fragment| from_pairs(url::form_urlencoded::parse(fragment.as_bytes())))
        });

    match &passkey {
        Some(_) => tracing::debug!("Passkey found in {}", url.host_str().unwrap_or_default()),
        None => tracing::debug!("No passkey found in announce URL"),
    }
    passkey
}

fn is_identifier(segment: &str) -> bool {
    PATH_IDENTIFIERS
        .iter()
        .any(|identifier| segment.eq_ignore_ascii_case(identifier))
}

fn from_path(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    if let Some(position) = segments.iter().position(|segment| is_identifier(segment)) {
        if position > 0 {
            return Some(segments[position - 1].to_string());
        }
    }

    segments
        .last()
        .filter(|segment| !is_identifier(segment))
        .map(|segment| segment.to_string())
}

fn from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> Option<String> {
    let pairs: Vec<_> = pairs.collect();
    QUERY_KEYS.iter().find_map(|wanted| {
        pairs
            .iter()
            .find(|(key, value)| key == wanted && !value.trim().is_empty())
            .map(|(_, value)| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_before_announce() {
        assert_eq!(
            extract_passkey("http://tracker.example.com:8080/a1b2c3/announce").as_deref(),
            Some("a1b2c3")
        );
        assert_eq!(
            extract_passkey("http://tracker.example.com/a1b2c3/Announce.php?uid=1").as_deref(),
            Some("a1b2c3")
        );
    }

    #[test]
    fn test_trailing_segment_fallback() {
        assert_eq!(
            extract_passkey("http://tracker.example.com/tracker/deadbeef").as_deref(),
            Some("deadbeef")
        );
    }

    #[test]
    fn test_query_and_fragment_keys() {
        assert_eq!(
            extract_passkey("http://tracker.example.com/announce?uid=3&passkey=xyz").as_deref(),
            Some("xyz")
        );
        assert_eq!(
            extract_passkey("http://tracker.example.com/announce?auth=&token=tok").as_deref(),
            Some("tok")
        );
        assert_eq!(
            extract_passkey("http://tracker.example.com/announce#key=frag").as_deref(),
            Some("frag")
        );
    }

    #[test]
    fn test_no_passkey() {
        assert_eq!(extract_passkey("http://tracker.example.com/announce"), None);
        assert_eq!(extract_passkey("not a url"), None);
        assert_eq!(extract_passkey(""), None);
    }
}
