use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use pollhub_core::PollError;
use pollhub_types::api::MessageResponse;

/// Everything a handler can fail with, rendered as `{"message": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] PollError),

    /// Anonymous vote without a usable network origin.
    #[error("Unable to determine caller origin")]
    UnknownOrigin,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Domain(PollError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Domain(e) => match e {
                PollError::Validation(_)
                | PollError::DuplicateUsername
                | PollError::InvalidCredentials
                | PollError::InvalidOption
                | PollError::AlreadyVoted => StatusCode::BAD_REQUEST,
                PollError::Unauthenticated => StatusCode::UNAUTHORIZED,
                PollError::Forbidden => StatusCode::FORBIDDEN,
                PollError::NotFound => StatusCode::NOT_FOUND,
                PollError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UnknownOrigin => StatusCode::BAD_REQUEST,
        };

        // Storage details stay in the logs.
        let message = match &self {
            ApiError::Domain(PollError::Storage(e)) => {
                error!("Storage failure: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(MessageResponse::new(message))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Run a blocking core call (SQLite, Argon2) off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> pollhub_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            PollError::Storage(anyhow::anyhow!("Blocking task failed: {}", e))
        })?
        .map_err(ApiError::from)
}
