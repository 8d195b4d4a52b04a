// Plain HTTP surface: the health probe.

use crate::interface_adapters::state::AppState;
use axum::{Json, extract::State};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Live rooms across the process.
    pub rooms: usize,
    /// Players currently seated in rooms.
    pub players: usize,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (rooms, players) = state.registry.counts().await;
    Json(HealthResponse {
        status: "ok",
        rooms,
        players,
    })
}
