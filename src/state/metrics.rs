use crate::intercept::{FetchOutcome, NavigationUpdate, Route};
use prometheus::{Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

pub struct Metrics {
    registry: Registry,

    // Request metrics
    pub total_requests: IntCounter,
    pub request_duration: Histogram,

    // Routing metrics
    pub navigations: IntCounter,
    pub timestamp_misses: IntCounter,
    pub rerouted: IntCounter,
    pub passthrough: IntCounter,
    pub fallbacks: IntCounter,

    // Browsing context metrics
    pub browsing_contexts: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let total_requests = IntCounter::new(
            "memento_proxy_requests_total",
            "Total number of intercepted requests",
        )
        .expect("metric creation failed");
        let request_duration = Histogram::with_opts(prometheus::HistogramOpts::new(
            "memento_proxy_request_duration_seconds",
            "Request duration in seconds",
        ))
        .expect("metric creation failed");

        let navigations = IntCounter::new(
            "memento_proxy_navigations_total",
            "Total number of navigation requests",
        )
        .expect("metric creation failed");
        let timestamp_misses = IntCounter::new(
            "memento_proxy_timestamp_misses_total",
            "Navigations whose URL carried no timestamp",
        )
        .expect("metric creation failed");
        let rerouted = IntCounter::new(
            "memento_proxy_rerouted_total",
            "Requests rerouted to the replay endpoint",
        )
        .expect("metric creation failed");
        let passthrough = IntCounter::new(
            "memento_proxy_passthrough_total",
            "Non-navigation requests dispatched unmodified",
        )
        .expect("metric creation failed");
        let fallbacks = IntCounter::new(
            "memento_proxy_fallbacks_total",
            "Requests answered with the fallback response",
        )
        .expect("metric creation failed");

        let browsing_contexts = IntGauge::new(
            "memento_proxy_browsing_contexts",
            "Number of live browsing contexts",
        )
        .expect("metric creation failed");

        // Register all metrics
        registry.register(Box::new(total_requests.clone())).unwrap();
        registry
            .register(Box::new(request_duration.clone()))
            .unwrap();
        registry.register(Box::new(navigations.clone())).unwrap();
        registry
            .register(Box::new(timestamp_misses.clone()))
            .unwrap();
        registry.register(Box::new(rerouted.clone())).unwrap();
        registry.register(Box::new(passthrough.clone())).unwrap();
        registry.register(Box::new(fallbacks.clone())).unwrap();
        registry
            .register(Box::new(browsing_contexts.clone()))
            .unwrap();

        Self {
            registry,
            total_requests,
            request_duration,
            navigations,
            timestamp_misses,
            rerouted,
            passthrough,
            fallbacks,
            browsing_contexts,
        }
    }

    pub fn record_request(&self) {
        self.total_requests.inc();
    }

    pub fn record_request_duration(&self, duration: std::time::Duration) {
        self.request_duration.observe(duration.as_secs_f64());
    }

    pub fn record_outcome(&self, outcome: &FetchOutcome) {
        match &outcome.route {
            Route::Navigation(update) => {
                self.navigations.inc();
                if *update == NavigationUpdate::TimestampMissing {
                    self.timestamp_misses.inc();
                }
            }
            Route::Rerouted { .. } => self.rerouted.inc(),
            Route::Uncontrolled | Route::Internal | Route::Replay | Route::Unrouted => {
                self.passthrough.inc()
            }
            Route::Refused => {}
        }

        if outcome.is_fallback() {
            self.fallbacks.inc();
        }
    }

    pub fn set_browsing_contexts(&self, count: usize) {
        self.browsing_contexts.set(count as i64);
    }

    pub fn gather_metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.gather_metrics(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

pub struct RequestTimer {
    start: Instant,
    metrics: Arc<Metrics>,
}

impl RequestTimer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    pub fn finish(self, outcome: &FetchOutcome) {
        self.metrics.record_request_duration(self.start.elapsed());
        self.metrics.record_outcome(outcome);
    }
}
