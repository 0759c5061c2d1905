use crate::error::{ProxyError, Result};
use crate::state::AppState;
use bytes::Bytes;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::host::Authority;
use warp::http::{HeaderMap, Method};
use warp::path::FullPath;
use warp::Filter;

pub mod handler;

pub use handler::RequestHandler;

/// The listener pages send their fetches through.
pub struct ProxyServer {
    state: Arc<AppState>,
    handler: Arc<RequestHandler>,
}

impl ProxyServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let handler = Arc::new(RequestHandler::new(state.clone()));
        Self { state, handler }
    }

    pub async fn run(self) -> Result<()> {
        let (addr, server) = self.bind()?;
        tracing::info!("Proxy server listening on {}", addr);

        server.await;

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Binds the configured address. The returned future serves until shutdown.
    pub fn bind(self) -> Result<(SocketAddr, impl Future<Output = ()>)> {
        let addr: SocketAddr = self
            .state
            .config
            .proxy_address()
            .parse()
            .map_err(|e| ProxyError::InvalidAddress(format!("proxy address: {e}")))?;

        let routes = routes(self.handler.clone());
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.recv().await;
            })
            .map_err(|e| ProxyError::Bind(format!("{addr}: {e}")))
    }
}

/// Every method and path is a fetch to intercept.
pub fn routes(
    handler: Arc<RequestHandler>,
) -> impl Filter<Extract = (warp::reply::Response,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::host::optional())
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_handler(handler))
        .and_then(handle_fetch)
}

fn with_handler(
    handler: Arc<RequestHandler>,
) -> impl Filter<Extract = (Arc<RequestHandler>,), Error = Infallible> + Clone {
    warp::any().map(move || handler.clone())
}

async fn handle_fetch(
    method: Method,
    authority: Option<Authority>,
    path: FullPath,
    query: String,
    headers: HeaderMap,
    body: Bytes,
    handler: Arc<RequestHandler>,
) -> std::result::Result<warp::reply::Response, warp::Rejection> {
    let path_and_query = if query.is_empty() {
        path.as_str().to_string()
    } else {
        format!("{}?{}", path.as_str(), query)
    };

    let authority = authority.map(|authority| authority.as_str().to_string());
    Ok(handler
        .handle(method, authority, path_and_query, headers, body)
        .await)
}
