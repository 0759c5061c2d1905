use super::timestamp::{Timestamp, TIMESTAMP_LEN};
use crate::error::InterceptError;
use url::Url;

pub const MEMENTO_PATH: &str = "memento";

/// The local replay service that serves archived captures at
/// `http://<host>:<port>/memento/<timestamp>/<original-url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayEndpoint {
    base: String,
}

impl ReplayEndpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base: format!("http://{host}:{port}"),
        }
    }

    /// `http://<host>:<port>`, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn prefix(&self) -> String {
        format!("{}/{}/", self.base, MEMENTO_PATH)
    }

    /// Target for `original` as captured at `timestamp`. An origin-relative original is
    /// first resolved against the replay origin, the origin archived pages are served
    /// from. The resulting absolute URL is embedded verbatim so
    /// [`ReplayEndpoint::decode`] recovers it byte for byte.
    pub fn reroute(&self, timestamp: &Timestamp, original: &str) -> Result<String, InterceptError> {
        check_original(original)?;

        let original = self.absolute(original);
        let target = format!("{}{}/{}", self.prefix(), timestamp, original);
        Url::parse(&target)
            .map_err(|e| InterceptError::MalformedUrl(format!("{target}: {e}")))?;
        Ok(target)
    }

    /// Whether `url`, absolute or origin-relative, already points at a capture on this
    /// endpoint.
    pub fn is_replay_url(&self, url: &str) -> bool {
        self.decode(&self.absolute(url)).is_some()
    }

    fn absolute(&self, original: &str) -> String {
        if is_origin_relative(original) {
            format!("{}{}", self.base, original)
        } else {
            original.to_string()
        }
    }

    /// Inverse of [`ReplayEndpoint::reroute`]. Origin-relative originals come back in
    /// their resolved, absolute form.
    pub fn decode(&self, target: &str) -> Option<(Timestamp, String)> {
        let rest = target.strip_prefix(&self.prefix())?;
        if rest.len() <= TIMESTAMP_LEN || !rest.is_char_boundary(TIMESTAMP_LEN) {
            return None;
        }
        let (digits, tail) = rest.split_at(TIMESTAMP_LEN);
        let original = tail.strip_prefix('/')?;
        Some((Timestamp::parse(digits)?, original.to_string()))
    }
}

fn is_origin_relative(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}

/// Accepts absolute http(s) URLs and origin-relative paths.
fn check_original(original: &str) -> Result<(), InterceptError> {
    if original.is_empty() {
        return Err(InterceptError::MalformedUrl("empty URL".to_string()));
    }
    if original.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(InterceptError::MalformedUrl(format!(
            "{original}: contains whitespace or control characters"
        )));
    }
    if is_origin_relative(original) {
        return Ok(());
    }

    let parsed =
        Url::parse(original).map_err(|e| InterceptError::MalformedUrl(format!("{original}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        scheme => Err(InterceptError::MalformedUrl(format!(
            "{original}: unsupported scheme '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ReplayEndpoint {
        ReplayEndpoint::new("127.0.0.1", 5000)
    }

    fn ts() -> Timestamp {
        Timestamp::parse("20200101120000").unwrap()
    }

    #[test]
    fn test_reroute_absolute_url() {
        let target = endpoint()
            .reroute(&ts(), "http://example.com/style.css")
            .unwrap();
        assert_eq!(
            target,
            "http://127.0.0.1:5000/memento/20200101120000/http://example.com/style.css"
        );
    }

    #[test]
    fn test_decode_recovers_inputs() {
        let endpoint = endpoint();
        for original in [
            "http://example.com/style.css",
            "https://example.com/a/b?c=d&e=f#frag",
            "http://example.com/20190101000000/odd/path",
        ] {
            let target = endpoint.reroute(&ts(), original).unwrap();
            assert_eq!(endpoint.decode(&target), Some((ts(), original.to_string())));
        }
    }

    #[test]
    fn test_origin_relative_resolves_against_replay_origin() {
        let endpoint = endpoint();
        let target = endpoint.reroute(&ts(), "/favicon.ico").unwrap();
        assert_eq!(
            target,
            "http://127.0.0.1:5000/memento/20200101120000/http://127.0.0.1:5000/favicon.ico"
        );
        assert!(!target.contains("//favicon.ico"));
        assert_eq!(
            endpoint.decode(&target),
            Some((ts(), "http://127.0.0.1:5000/favicon.ico".to_string()))
        );
    }

    #[test]
    fn test_is_replay_url() {
        let endpoint = endpoint();
        assert!(endpoint.is_replay_url(
            "http://127.0.0.1:5000/memento/20200101120005/http://example.com/style.css"
        ));
        assert!(endpoint.is_replay_url("/memento/20200101120005/http://example.com/style.css"));
        assert!(!endpoint.is_replay_url("http://example.com/memento/20200101120005/x"));
        assert!(!endpoint.is_replay_url("/20200101120005/http://example.com/"));
    }

    #[test]
    fn test_decode_rejects_foreign_urls() {
        let endpoint = endpoint();
        assert_eq!(endpoint.decode("http://example.com/style.css"), None);
        assert_eq!(
            endpoint.decode("http://127.0.0.1:5000/memento/2020/http://example.com/"),
            None
        );
        assert_eq!(
            endpoint.decode("http://127.0.0.1:5000/memento/20200101120000"),
            None
        );
        assert_eq!(
            endpoint.decode("http://127.0.0.1:5001/memento/20200101120000/http://a.com/"),
            None
        );
    }

    #[test]
    fn test_malformed_originals() {
        let endpoint = endpoint();
        for bad in [
            "",
            "not a url",
            "example.com/style.css",
            "javascript:alert(1)",
            "data:text/plain,hi",
            "//example.com/protocol-relative",
            "http://",
        ] {
            assert!(
                matches!(
                    endpoint.reroute(&ts(), bad),
                    Err(InterceptError::MalformedUrl(_))
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }
}
