//! HTTP-facing errors.
//!
//! - InvalidInput → 400 with the message as `error`
//! - StoreFailure → 500 with a fixed message; the cause goes to the log and,
//!   in debug builds only, to `details`

use crate::calendar::CalendarError;
use crate::persist::SaveFileError;
use crate::world::WorldError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{context}: {source}")]
    StoreFailure {
        context: &'static str,
        source: SaveFileError,
    },
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::InvalidInput(message.into())
    }

    pub fn store(context: &'static str) -> impl FnOnce(SaveFileError) -> Self {
        move |source| ApiError::StoreFailure { context, source }
    }
}

impl From<CalendarError> for ApiError {
    fn from(e: CalendarError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

impl From<WorldError> for ApiError {
    fn from(e: WorldError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::InvalidInput(message) => {
                tracing::warn!(%message, "rejected request");
                (StatusCode::BAD_REQUEST, ErrorBody { error: message, details: None })
            }
            ApiError::StoreFailure { context, source } => {
                tracing::error!(error = %source, "{context}");
                let details = cfg!(debug_assertions).then(|| source.to_string());
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody { error: context.to_string(), details },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn store_failure_is_a_generic_500() {
        let (status, body) = render(ApiError::StoreFailure {
            context: "Unable to update task status",
            source: SaveFileError::Redb("disk full".into()),
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Unable to update task status");
        if cfg!(debug_assertions) {
            assert_eq!(body["details"], "redb: disk full");
        } else {
            assert!(body.get("details").is_none());
        }
    }

    #[tokio::test]
    async fn invalid_input_is_a_400_without_details() {
        let (status, body) = render(WorldError::TaskNotFound(9).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "Task 9 not found" }));
    }
}
