use async_trait::async_trait;
use memento_rewrite_proxy::config::{Config, MissingTimestampPolicy};
use memento_rewrite_proxy::error::{FetchError, InterceptError};
use memento_rewrite_proxy::fetch::Fetcher;
use memento_rewrite_proxy::intercept::{
    ContextRegistry, DispatchRequest, FetchResponse, InterceptedRequest, Interceptor,
    InterceptorSettings, NavigationUpdate, RequestMode, Route, Timestamp,
};
use std::sync::{Arc, Mutex};

/// Records every dispatched URL and answers 200, or fails for URLs it was told to.
#[derive(Default)]
struct RecordingFetcher {
    seen: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl RecordingFetcher {
    fn failing_on(url: &str) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            failing: vec![url.to_string()],
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, request: DispatchRequest) -> Result<FetchResponse, FetchError> {
        self.seen.lock().unwrap().push(request.url.clone());
        if self.failing.contains(&request.url) {
            return Err(FetchError::Connect("connection refused".to_string()));
        }
        Ok(FetchResponse::new(200, "OK").with_body(format!("served {}", request.url)))
    }
}

async fn interceptor(config: &Config, fetcher: Arc<RecordingFetcher>) -> Interceptor {
    let interceptor = Interceptor::new(InterceptorSettings::from_config(config), fetcher);
    interceptor.on_install().await;
    interceptor.on_activate().await.unwrap();
    interceptor
}

fn subresource(url: &str) -> InterceptedRequest {
    InterceptedRequest::new(url, RequestMode::NoCors)
}

#[tokio::test]
async fn test_navigation_then_subresource_is_rerouted() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let contexts = ContextRegistry::new();
    let tab = contexts.get_or_create("tab");

    let outcome = interceptor
        .on_fetch(
            &tab,
            InterceptedRequest::navigate("/20200101120000/http://example.com/"),
        )
        .await;
    assert!(!outcome.is_fallback());
    assert!(matches!(
        outcome.route,
        Route::Navigation(NavigationUpdate::Recorded { previous: None, .. })
    ));

    let outcome = interceptor
        .on_fetch(&tab, subresource("http://example.com/style.css"))
        .await;
    assert_eq!(
        outcome.route,
        Route::Rerouted {
            target: "http://127.0.0.1:5000/memento/20200101120000/http://example.com/style.css"
                .to_string()
        }
    );
    assert_eq!(outcome.response().status, 200);

    assert_eq!(
        fetcher.seen(),
        vec![
            "/20200101120000/http://example.com/".to_string(),
            "http://127.0.0.1:5000/memento/20200101120000/http://example.com/style.css"
                .to_string(),
        ]
    );
}

#[tokio::test]
async fn test_webui_requests_pass_through_unchanged() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let tab = ContextRegistry::new().get_or_create("tab");
    tab.record(Timestamp::parse("20200101120000").unwrap());

    let outcome = interceptor
        .on_fetch(&tab, subresource("/webui/assets/app.js"))
        .await;

    assert_eq!(outcome.route, Route::Internal);
    assert_eq!(fetcher.seen(), vec!["/webui/assets/app.js".to_string()]);
}

#[tokio::test]
async fn test_later_navigation_replaces_timestamp() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let tab = ContextRegistry::new().get_or_create("tab");

    interceptor
        .on_fetch(
            &tab,
            InterceptedRequest::navigate("/20200101120000/http://example.com/"),
        )
        .await;
    let outcome = interceptor
        .on_fetch(
            &tab,
            InterceptedRequest::navigate("/20210615083000/http://example.com/page"),
        )
        .await;

    match outcome.route {
        Route::Navigation(NavigationUpdate::Recorded {
            timestamp,
            previous,
        }) => {
            assert_eq!(timestamp.as_str(), "20210615083000");
            assert_eq!(previous.unwrap().as_str(), "20200101120000");
        }
        other => panic!("unexpected route {other:?}"),
    }

    interceptor
        .on_fetch(&tab, subresource("http://example.com/img.png"))
        .await;
    assert_eq!(
        fetcher.seen().last().unwrap(),
        "http://127.0.0.1:5000/memento/20210615083000/http://example.com/img.png"
    );
}

#[tokio::test]
async fn test_failed_reroute_serves_fallback() {
    let target = "http://127.0.0.1:5000/memento/20200101120000/http://example.com/missing.js";
    let fetcher = Arc::new(RecordingFetcher::failing_on(target));
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let tab = ContextRegistry::new().get_or_create("tab");
    tab.record(Timestamp::parse("20200101120000").unwrap());

    let outcome = interceptor
        .on_fetch(&tab, subresource("http://example.com/missing.js"))
        .await;

    assert!(outcome.is_fallback());
    assert!(matches!(
        outcome.cause(),
        Some(InterceptError::Network(FetchError::Connect(_)))
    ));
    let response = outcome.into_response();
    assert_eq!(response.status, 503);
    assert_eq!(response.header("Content-Type"), Some("text/html"));

    // The failure stays local to that fetch
    let outcome = interceptor
        .on_fetch(&tab, subresource("http://example.com/ok.js"))
        .await;
    assert!(!outcome.is_fallback());
}

#[tokio::test]
async fn test_subresource_before_any_navigation() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let tab = ContextRegistry::new().get_or_create("tab");

    let outcome = interceptor
        .on_fetch(&tab, subresource("http://example.com/early.css"))
        .await;
    assert!(outcome.is_fallback());
    assert_eq!(outcome.cause(), Some(&InterceptError::NoTimestamp));
    assert!(fetcher.seen().is_empty());

    let mut config = Config::default();
    config.intercept.missing_timestamp_policy = MissingTimestampPolicy::Passthrough;
    let interceptor = self::interceptor(&config, fetcher.clone()).await;

    let outcome = interceptor
        .on_fetch(&tab, subresource("http://example.com/early.css"))
        .await;
    assert_eq!(outcome.route, Route::Unrouted);
    assert_eq!(fetcher.seen(), vec!["http://example.com/early.css".to_string()]);
}

#[tokio::test]
async fn test_browsing_contexts_are_isolated() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let contexts = ContextRegistry::new();
    let first = contexts.get_or_create("first");
    let second = contexts.get_or_create("second");

    interceptor
        .on_fetch(
            &first,
            InterceptedRequest::navigate("/20200101120000/http://a.example/"),
        )
        .await;
    interceptor
        .on_fetch(
            &second,
            InterceptedRequest::navigate("/19990101000000/http://b.example/"),
        )
        .await;

    interceptor
        .on_fetch(&first, subresource("http://a.example/x.js"))
        .await;
    interceptor
        .on_fetch(&second, subresource("http://b.example/y.js"))
        .await;

    let seen = fetcher.seen();
    assert_eq!(
        seen[2],
        "http://127.0.0.1:5000/memento/20200101120000/http://a.example/x.js"
    );
    assert_eq!(
        seen[3],
        "http://127.0.0.1:5000/memento/19990101000000/http://b.example/y.js"
    );
}

#[tokio::test]
async fn test_navigation_without_timestamp_keeps_previous() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = interceptor(&Config::default(), fetcher.clone()).await;
    let tab = ContextRegistry::new().get_or_create("tab");
    tab.record(Timestamp::parse("20200101120000").unwrap());

    let outcome = interceptor
        .on_fetch(&tab, InterceptedRequest::navigate("/webui/index.html"))
        .await;

    assert_eq!(
        outcome.route,
        Route::Navigation(NavigationUpdate::TimestampMissing)
    );
    assert_eq!(tab.timestamp().unwrap().as_str(), "20200101120000");
}

#[tokio::test]
async fn test_fetches_before_activation_are_uncontrolled() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let interceptor = Interceptor::new(
        InterceptorSettings::from_config(&Config::default()),
        fetcher.clone(),
    );
    let tab = ContextRegistry::new().get_or_create("tab");

    let outcome = interceptor
        .on_fetch(
            &tab,
            InterceptedRequest::navigate("/20200101120000/http://example.com/"),
        )
        .await;

    assert_eq!(outcome.route, Route::Uncontrolled);
    assert!(tab.timestamp().is_none());
}
