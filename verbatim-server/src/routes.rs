//! Administrative HTTP surface: service info, health, model listing and
//! switching. The WebSocket endpoint lives in `ws.rs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::warn;
use verbatim_core::{BackendDescriptor, VerbatimError};

use crate::state::AppState;

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Verbatim speech-to-text API",
        "endpoints": {
            "websocket": "/ws",
            "models": "/models",
            "health": "/health",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.manager.is_loaded(),
        "device": state.manager.device(),
        "active_sessions": state.registry.len(),
    }))
}

pub async fn list_models(State(state): State<AppState>) -> Json<BackendDescriptor> {
    Json(state.manager.describe())
}

/// Switch the shared backend by name. Unknown variants are a client error;
/// load failures are a server error and leave the previous model active.
pub async fn change_model(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.load_variant(&name).await {
        Ok(change) => Json(json!({
            "message": format!("Model changed to {}", change.variant),
            "device": change.device,
        }))
        .into_response(),
        Err(e @ VerbatimError::UnknownVariant { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => {
            warn!(model = %name, error = %e, "model switch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
