use bytes::Bytes;
use std::fmt;

/// Fetch mode of an intercepted request, as reported by `Sec-Fetch-Mode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
    Websocket,
    Other(String),
}

impl RequestMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Self::Navigate,
            "same-origin" => Self::SameOrigin,
            "no-cors" => Self::NoCors,
            "cors" => Self::Cors,
            "websocket" => Self::Websocket,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, Self::Navigate)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::NoCors => "no-cors",
            Self::Cors => "cors",
            Self::Websocket => "websocket",
            Self::Other(other) => other,
        }
    }
}

impl Default for RequestMode {
    /// Embedded resources (`<img>`, `<script>`, `<link>`) fetch in `no-cors` mode.
    fn default() -> Self {
        Self::NoCors
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing fetch as the page issued it. Consumed once by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl InterceptedRequest {
    pub fn new(url: impl Into<String>, mode: RequestMode) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            mode,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(url, RequestMode::Navigate)
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The request as issued, untouched.
    pub fn into_dispatch(self) -> DispatchRequest {
        DispatchRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }

    /// The same request aimed at a different target.
    pub fn into_rerouted(self, target: String) -> DispatchRequest {
        DispatchRequest {
            method: self.method,
            url: target,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// The request actually handed to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}
