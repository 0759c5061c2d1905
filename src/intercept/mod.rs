//! Fetch interception and Memento rerouting.
//!
//! Navigations record the capture timestamp of the archived page in their browsing
//! context and pass through. Every other fetch is rewritten to
//! `http://<host>:<port>/memento/<timestamp>/<original-url>` unless its URL carries an
//! internal-UI marker. Fetches that fail for any reason are answered with a fixed 503
//! page instead of an error.

pub mod context;
pub mod endpoint;
pub mod handler;
pub mod request;
pub mod response;
pub mod timestamp;

pub use context::{
    ContextRegistry, ContextSnapshot, NavigationContext, NavigationState, DEFAULT_CONTEXT_ID,
};
pub use endpoint::ReplayEndpoint;
pub use handler::{
    FetchOutcome, Interceptor, InterceptorSettings, LifecycleState, NavigationUpdate, Route,
    Served,
};
pub use request::{DispatchRequest, InterceptedRequest, RequestMode};
pub use response::FetchResponse;
pub use timestamp::{Timestamp, TimestampExtractor};
