use crate::config::Config;
use crate::intercept::{FetchResponse, InterceptedRequest, RequestMode, DEFAULT_CONTEXT_ID};
use crate::intercept::response::{FALLBACK_BODY, FALLBACK_CONTENT_TYPE};
use crate::state::metrics::RequestTimer;
use crate::state::AppState;
use bytes::Bytes;
use std::sync::Arc;
use url::Url;
use warp::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use warp::http::{Method, StatusCode};

const FETCH_MODE_HEADER: &str = "sec-fetch-mode";

/// Turns proxied HTTP requests into fetch events and fetch outcomes back into HTTP.
pub struct RequestHandler {
    state: Arc<AppState>,
    own_authorities: Vec<String>,
    context_header: String,
}

impl RequestHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        let own_authorities = own_authorities(&state.config);
        let context_header = state.config.proxy.context_header.to_ascii_lowercase();

        Self {
            state,
            own_authorities,
            context_header,
        }
    }

    /// Requests addressed to another host (absolute-form or a foreign `Host`) keep their
    /// absolute URL; requests for the proxy's own origin become origin-relative.
    pub fn request_url(&self, authority: Option<&str>, path_and_query: &str) -> String {
        match authority {
            Some(authority) if !self.is_own_authority(authority) => {
                format!("http://{authority}{path_and_query}")
            }
            _ => path_and_query.to_string(),
        }
    }

    fn is_own_authority(&self, authority: &str) -> bool {
        self.own_authorities
            .iter()
            .any(|own| own.eq_ignore_ascii_case(authority))
    }

    pub fn context_id(&self, headers: &HeaderMap) -> String {
        headers
            .get(self.context_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTEXT_ID)
            .to_string()
    }

    pub fn build_request(
        &self,
        method: &Method,
        url: String,
        headers: &HeaderMap,
        body: Bytes,
    ) -> InterceptedRequest {
        let mode = headers
            .get(FETCH_MODE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(RequestMode::parse)
            .unwrap_or_default();

        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        InterceptedRequest {
            method: method.as_str().to_string(),
            url,
            mode,
            headers,
            body,
        }
    }

    pub async fn handle(
        &self,
        method: Method,
        authority: Option<String>,
        path_and_query: String,
        headers: HeaderMap,
        body: Bytes,
    ) -> warp::reply::Response {
        let url = self.request_url(authority.as_deref(), &path_and_query);
        let context_id = self.context_id(&headers);
        let request = self.build_request(&method, url, &headers, body);

        let timer = RequestTimer::new(self.state.metrics.clone());
        let context = self.state.browsing_context(&context_id);
        let outcome = self.state.interceptor.on_fetch(&context, request).await;
        timer.finish(&outcome);

        into_reply(outcome.into_response())
    }
}

fn own_authorities(config: &Config) -> Vec<String> {
    let port = config.proxy.port;
    let mut authorities = vec![
        format!("{}:{}", config.proxy.host, port),
        format!("localhost:{port}"),
        format!("127.0.0.1:{port}"),
    ];
    if port == 80 {
        authorities.push(config.proxy.host.clone());
        authorities.push("localhost".to_string());
    }

    if let Some(origin) = config
        .proxy
        .public_origin
        .as_deref()
        .and_then(|origin| Url::parse(origin).ok())
    {
        if let Some(host) = origin.host_str() {
            match origin.port() {
                Some(port) => authorities.push(format!("{host}:{port}")),
                None => authorities.push(host.to_string()),
            }
        }
    }

    authorities
}

pub fn into_reply(response: FetchResponse) -> warp::reply::Response {
    let mut builder = warp::http::Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(warp::hyper::Body::from(response.body))
        .unwrap_or_else(|e| {
            tracing::warn!("Unrepresentable response, serving fallback: {}", e);
            let mut reply = warp::reply::Response::new(FALLBACK_BODY.into());
            *reply.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            reply
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
            reply
        })
}
