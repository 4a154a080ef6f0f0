use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{store::sessions, AppState};

/// Axum middleware that validates `Authorization: Bearer <token>` against
/// the admin session table.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(header) = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
    else {
        return unauthorized("missing authorization header");
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        return unauthorized("invalid authorization format");
    };

    let hash = sessions::hash_token(token);
    match state.store.find_session_by_hash(&hash) {
        Ok(Some(_)) => next.run(request).await,
        Ok(None) => unauthorized("invalid token"),
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response()
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": message}))).into_response()
}
