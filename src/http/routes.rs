//! HTTP route definitions

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::{flappy_ws_handler, pong_ws_handler, snake_ws_handler};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Game pages are static bundles served elsewhere; any origin may open
    // a socket here
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/pong", get(pong_ws_handler))
        .route("/ws/snake", get(snake_ws_handler))
        .route("/ws/flappy", get(flappy_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected: ConnectedCounts,
}

/// Socket counts per game namespace
#[derive(Serialize)]
struct ConnectedCounts {
    pong: usize,
    snake: usize,
    flappy: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connected: ConnectedCounts {
            pong: state.pong.connected(),
            snake: state.snake.connected(),
            flappy: state.flappy.connected(),
        },
    })
}
