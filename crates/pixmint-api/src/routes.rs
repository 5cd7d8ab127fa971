use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, post},
};

use crate::images;
use crate::state::AppState;
use crate::tokens;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tokens", post(tokens::handle_tokens))
        .route("/api/generate-image", post(images::generate_image))
        .route("/api/users/{user_id}/images", get(images::list_images))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
