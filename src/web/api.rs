use crate::state::AppState;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let metrics = metrics_route(state.clone());
    let contexts = contexts_routes(state);

    metrics.or(contexts)
}

fn metrics_route(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("metrics")
        .and(warp::get())
        .and(with_state(state))
        .and_then(get_metrics)
}

fn contexts_routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("contexts")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_contexts);

    let remove = warp::path!("contexts" / String)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(remove_context);

    list.or(remove)
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn get_metrics(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::with_header(
        state.metrics.render(),
        "content-type",
        "text/plain; version=0.0.4",
    ))
}

async fn list_contexts(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "contexts": state.contexts.snapshot(),
    })))
}

async fn remove_context(id: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    if state.close_browsing_context(&id) {
        tracing::info!("Browsing context '{}' closed via admin API", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
