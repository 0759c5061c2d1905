//! Network access for dispatched requests.
//!
//! The interceptor never talks to the network directly; it hands every dispatched
//! request to a [`Fetcher`]. Production code uses [`HttpFetcher`], tests substitute
//! their own.

use crate::error::FetchError;
use crate::intercept::{DispatchRequest, FetchResponse};
use async_trait::async_trait;

pub mod http;

pub use http::HttpFetcher;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issues `request` and returns the response as received.
    async fn fetch(&self, request: DispatchRequest) -> Result<FetchResponse, FetchError>;
}
