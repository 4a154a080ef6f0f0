use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::passwd::PasswordError;

/// Failure vocabulary of the share subsystem. Everything except `Hashing`
/// and `Storage` is a routine outcome of untrusted input.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Gone(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("credential subsystem failure: {0}")]
    Hashing(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<PasswordError> for ShareError {
    fn from(e: PasswordError) -> Self {
        ShareError::Hashing(e.to_string())
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ShareError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ShareError::NotFound(m) => (StatusCode::NOT_FOUND, (*m).to_owned()),
            ShareError::Gone(m) => (StatusCode::GONE, (*m).to_owned()),
            ShareError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, (*m).to_owned()),
            ShareError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ShareError::Hashing(_) | ShareError::Storage(_) => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases: Vec<(ShareError, StatusCode)> = vec![
            (
                ShareError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ShareError::NotFound("missing"), StatusCode::NOT_FOUND),
            (ShareError::Gone("expired"), StatusCode::GONE),
            (ShareError::Unauthorized("nope"), StatusCode::UNAUTHORIZED),
            (ShareError::Conflict("clash".into()), StatusCode::CONFLICT),
            (
                ShareError::Hashing("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ShareError::Storage(anyhow::anyhow!("io")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
