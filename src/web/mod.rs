use crate::error::{ProxyError, Result};
use crate::state::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

pub mod api;

pub async fn start_server(state: Arc<AppState>) -> Result<()> {
    let (addr, server) = bind(state)?;
    tracing::info!("Admin server listening on {}", addr);

    server.await;

    tracing::info!("Admin server stopped");
    Ok(())
}

pub fn bind(state: Arc<AppState>) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let addr: SocketAddr = state
        .config
        .admin_address()
        .parse()
        .map_err(|e| ProxyError::InvalidAddress(format!("admin address: {e}")))?;

    let routes = create_routes(state.clone());
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    warp::serve(routes)
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_rx.recv().await;
        })
        .map_err(|e| ProxyError::Bind(format!("{addr}: {e}")))
}

pub fn create_routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let health_state = state.clone();
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let state = health_state.clone();
            async move {
                let lifecycle = state.interceptor.lifecycle().await;
                Ok::<_, warp::Rejection>(warp::reply::json(&serde_json::json!({
                    "status": "healthy",
                    "service": "memento-rewrite-proxy",
                    "lifecycle": lifecycle,
                    "replayEndpoint": state.interceptor.settings().endpoint.base_url(),
                })))
            }
        });

    health.or(api::routes(state))
}
