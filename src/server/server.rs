use anyhow::Result;
use std::time::Duration;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::websocket::ws_handler;
use super::{
    log_requests, metrics::metrics_handler, notification_routes, state::ServerState,
};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub queue: crate::retry_queue::QueueStats,
    pub connected_sellers: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        queue: state.retry_queue.stats().unwrap_or_default(),
        connected_sellers: state.ws_connection_manager.connected_seller_count().await,
    };
    Json(stats)
}

pub fn make_app(state: ServerState) -> Router {
    let seller_routes = notification_routes::make_seller_routes(state.clone());
    let internal_routes = notification_routes::make_internal_routes(state.clone());

    let ws_routes: Router = Router::new()
        .route("/{seller_id}", get(ws_handler))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone())
        .nest("/v1/sellers", seller_routes)
        .nest("/v1/internal", internal_routes)
        .nest("/v1/ws", ws_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(state: ServerState, cancellation_token: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;
    Ok(())
}
