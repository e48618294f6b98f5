// handlers/system.rs - GET /, GET /health and unmatched routes

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::classify::classify_storage;
use crate::error::ApiError;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "data": {
            "name": "Quill API",
            "version": version,
            "description": "Blog backend with policy-enforced generic model API",
            "entities": state.registry.names(),
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "login": "POST /auth/login (public - token acquisition)",
                "model": "/api/model/:entity[/:id] (policy enforced per record)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": classify_storage(&e),
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route matches {}", uri.path()))
}
