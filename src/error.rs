use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {0}")]
    Bind(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Environment variable error: {0}")]
    EnvVar(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Failure of the underlying network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Fetch failed: {0}")]
    Other(String),
}

/// Per-fetch failures. These never leave `on_fetch`; each one is turned into the
/// fallback response for the fetch it occurred in.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterceptError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    #[error("No navigation timestamp recorded for this browsing context")]
    NoTimestamp,

    #[error("Network failure: {0}")]
    Network(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, ProxyError>;

impl warp::reject::Reject for ProxyError {}
