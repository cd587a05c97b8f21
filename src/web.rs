use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use tower_http::cors::CorsLayer;

use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/scheduler/status", get(scheduler_status))
        .layer(CorsLayer::permissive())
        .with_state(AppState { scheduler })
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs = state.scheduler.status().await;
    Json(serde_json::json!({
        "success": true,
        "jobs": jobs
    }))
}
