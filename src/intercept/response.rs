use bytes::Bytes;

pub const FALLBACK_STATUS: u16 = 503;
pub const FALLBACK_STATUS_TEXT: &str = "Service Unavailable";
pub const FALLBACK_CONTENT_TYPE: &str = "text/html";
pub const FALLBACK_BODY: &str = "<!DOCTYPE html>\n\
<html>\n\
<head><title>Service Unavailable</title></head>\n\
<body>\n\
<h1>Service Unavailable</h1>\n\
<p>This archived resource could not be retrieved. The replay service may be unreachable.</p>\n\
</body>\n\
</html>\n";

/// A response handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// The fixed response served whenever a fetch cannot be completed.
    pub fn fallback() -> Self {
        Self {
            status: FALLBACK_STATUS,
            status_text: FALLBACK_STATUS_TEXT.to_string(),
            headers: vec![("Content-Type".to_string(), FALLBACK_CONTENT_TYPE.to_string())],
            body: Bytes::from_static(FALLBACK_BODY.as_bytes()),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
