use super::Fetcher;
use crate::config::Config;
use crate::error::FetchError;
use crate::intercept::{DispatchRequest, FetchResponse};
use async_trait::async_trait;
use url::Url;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
];

/// Fetches over HTTP with reqwest. Origin-relative targets resolve against the replay
/// server, which is the origin archived pages are served from.
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Url,
    context_header: String,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            // Redirects go back to the page so it can follow them through the proxy
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = config.upstream_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.upstream.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to build HTTP client: {e}")))?;

        let origin = Url::parse(config.replay_endpoint().base_url())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            origin,
            context_header: config.proxy.context_header.to_ascii_lowercase(),
        })
    }

    pub fn resolve(&self, target: &str) -> Result<Url, FetchError> {
        let resolved = if target.starts_with('/') && !target.starts_with("//") {
            self.origin.join(target)
        } else {
            Url::parse(target)
        };
        resolved.map_err(|e| FetchError::InvalidRequest(format!("{target}: {e}")))
    }

    fn forwards_request_header(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        name != "host"
            && name != "content-length"
            && name != self.context_header
            && !HOP_BY_HOP_HEADERS.contains(&name.as_str())
    }
}

fn forwards_response_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name != "content-length" && !HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_connect() {
        FetchError::Connect(error.to_string())
    } else if error.is_builder() {
        FetchError::InvalidRequest(error.to_string())
    } else {
        FetchError::Other(error.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: DispatchRequest) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {e}", request.method)))?;

        tracing::debug!("Fetching {} {}", method, url);

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            if self.forwards_request_header(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(classify)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| forwards_response_header(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
