//! WebSocket upgrade endpoints for the push channels.

use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;

/// `GET /ws/jobs`: job progress stream.
pub async fn jobs_channel_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        state.push_hub.serve_jobs(socket).await;
    })
}

/// `GET /ws/performance`: performance-control stream and command intake.
pub async fn performance_channel_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        state.push_hub.serve_performance(socket).await;
    })
}
