use super::context::NavigationContext;
use super::endpoint::ReplayEndpoint;
use super::request::InterceptedRequest;
use super::response::FetchResponse;
use super::timestamp::{Timestamp, TimestampExtractor};
use crate::config::{Config, MissingTimestampPolicy};
use crate::error::{InterceptError, LifecycleError};
use crate::fetch::Fetcher;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Parsed,
    Installed,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installed => "installed",
            Self::Active => "active",
        };
        f.write_str(name)
    }
}

/// How a navigation affected its browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationUpdate {
    Recorded {
        timestamp: Timestamp,
        previous: Option<Timestamp>,
    },
    /// The URL had no timestamp segment; the context kept its previous value.
    TimestampMissing,
}

/// Routing decision taken for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not active yet, the page is not controlled.
    Uncontrolled,
    Navigation(NavigationUpdate),
    /// URL carries an internal-UI marker.
    Internal,
    Rerouted { target: String },
    /// Already addressed to the replay endpoint, e.g. a followed replay redirect.
    Replay,
    /// No timestamp yet and the policy lets the original through.
    Unrouted,
    /// The request could not be routed and was never dispatched.
    Refused,
}

impl Route {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uncontrolled => "uncontrolled",
            Self::Navigation(_) => "navigation",
            Self::Internal => "internal",
            Self::Rerouted { .. } => "rerouted",
            Self::Replay => "replay",
            Self::Unrouted => "unrouted",
            Self::Refused => "refused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Network(FetchResponse),
    Fallback {
        response: FetchResponse,
        cause: InterceptError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub route: Route,
    pub served: Served,
}

impl FetchOutcome {
    fn network(route: Route, response: FetchResponse) -> Self {
        Self {
            route,
            served: Served::Network(response),
        }
    }

    fn fallback(route: Route, cause: InterceptError) -> Self {
        Self {
            route,
            served: Served::Fallback {
                response: FetchResponse::fallback(),
                cause,
            },
        }
    }

    pub fn response(&self) -> &FetchResponse {
        match &self.served {
            Served::Network(response) | Served::Fallback { response, .. } => response,
        }
    }

    pub fn into_response(self) -> FetchResponse {
        match self.served {
            Served::Network(response) | Served::Fallback { response, .. } => response,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.served, Served::Fallback { .. })
    }

    pub fn cause(&self) -> Option<&InterceptError> {
        match &self.served {
            Served::Network(_) => None,
            Served::Fallback { cause, .. } => Some(cause),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterceptorSettings {
    pub endpoint: ReplayEndpoint,
    pub internal_markers: Vec<String>,
    pub missing_timestamp_policy: MissingTimestampPolicy,
}

impl InterceptorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.replay_endpoint(),
            internal_markers: config.intercept.internal_markers.clone(),
            missing_timestamp_policy: config.intercept.missing_timestamp_policy,
        }
    }
}

impl Default for InterceptorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Reroutes subresource fetches of archived pages to the replay endpoint.
///
/// One interceptor serves every browsing context; the caller passes the context a
/// fetch belongs to into [`Interceptor::on_fetch`].
pub struct Interceptor {
    settings: InterceptorSettings,
    extractor: TimestampExtractor,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: RwLock<LifecycleState>,
}

impl Interceptor {
    pub fn new(settings: InterceptorSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            settings,
            extractor: TimestampExtractor::new(),
            fetcher,
            lifecycle: RwLock::new(LifecycleState::Parsed),
        }
    }

    pub fn settings(&self) -> &InterceptorSettings {
        &self.settings
    }

    pub async fn lifecycle(&self) -> LifecycleState {
        *self.lifecycle.read().await
    }

    pub async fn on_install(&self) {
        let mut state = self.lifecycle.write().await;
        if *state == LifecycleState::Parsed {
            *state = LifecycleState::Installed;
            tracing::info!("Interceptor installed");
        }
    }

    pub async fn on_activate(&self) -> Result<(), LifecycleError> {
        let mut state = self.lifecycle.write().await;
        match *state {
            LifecycleState::Installed => {
                *state = LifecycleState::Active;
                tracing::info!(
                    "Interceptor active, rerouting to {}",
                    self.settings.endpoint.base_url()
                );
                Ok(())
            }
            LifecycleState::Active => Ok(()),
            LifecycleState::Parsed => Err(LifecycleError::InvalidStateTransition {
                from: LifecycleState::Parsed.to_string(),
                to: LifecycleState::Active.to_string(),
            }),
        }
    }

    /// Handles one intercepted fetch. Never fails: every error becomes the fallback
    /// response for this fetch alone.
    pub async fn on_fetch(
        &self,
        context: &NavigationContext,
        request: InterceptedRequest,
    ) -> FetchOutcome {
        let route = if self.lifecycle().await == LifecycleState::Active {
            self.route(context, &request)
        } else {
            Ok(Route::Uncontrolled)
        };

        let route = match route {
            Ok(route) => route,
            Err(cause) => {
                tracing::warn!("Refusing {} {}: {}", request.method, request.url, cause);
                return FetchOutcome::fallback(Route::Refused, cause);
            }
        };

        tracing::debug!(
            "{} {} ({}) -> {}",
            request.method,
            request.url,
            request.mode,
            route.label()
        );

        let dispatch = match &route {
            Route::Rerouted { target } => request.into_rerouted(target.clone()),
            _ => request.into_dispatch(),
        };
        let target = dispatch.url.clone();

        match self.fetcher.fetch(dispatch).await {
            Ok(response) => FetchOutcome::network(route, response),
            Err(e) => {
                tracing::warn!("Fetch of {} failed, serving fallback: {}", target, e);
                FetchOutcome::fallback(route, InterceptError::Network(e))
            }
        }
    }

    /// Routing decision for `request`, updating `context` on navigations.
    pub fn route(
        &self,
        context: &NavigationContext,
        request: &InterceptedRequest,
    ) -> Result<Route, InterceptError> {
        if request.mode.is_navigation() {
            return Ok(Route::Navigation(self.record_navigation(context, &request.url)));
        }

        if self.is_internal(&request.url) {
            return Ok(Route::Internal);
        }

        if self.settings.endpoint.is_replay_url(&request.url) {
            return Ok(Route::Replay);
        }

        match context.timestamp() {
            Some(timestamp) => {
                let target = self.settings.endpoint.reroute(&timestamp, &request.url)?;
                Ok(Route::Rerouted { target })
            }
            None => match self.settings.missing_timestamp_policy {
                MissingTimestampPolicy::Reject => Err(InterceptError::NoTimestamp),
                MissingTimestampPolicy::Passthrough => Ok(Route::Unrouted),
            },
        }
    }

    fn is_internal(&self, url: &str) -> bool {
        self.settings
            .internal_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }

    fn record_navigation(&self, context: &NavigationContext, url: &str) -> NavigationUpdate {
        match self.extractor.extract(url) {
            Some(timestamp) => {
                match timestamp.as_datetime() {
                    Some(at) => tracing::info!("Navigated to {} (capture {})", url, at),
                    None => tracing::info!("Navigated to {} (timestamp {})", url, timestamp),
                }
                let previous = context.record(timestamp.clone());
                NavigationUpdate::Recorded {
                    timestamp,
                    previous,
                }
            }
            None => {
                tracing::warn!(
                    "Navigation to {} carries no timestamp, keeping {}",
                    url,
                    context
                        .timestamp()
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                NavigationUpdate::TimestampMissing
            }
        }
    }
}
