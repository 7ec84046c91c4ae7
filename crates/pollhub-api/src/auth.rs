use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use pollhub_core::{IdentityService, PollService};
use pollhub_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::error::{ApiError, run_blocking};
use crate::extract::JsonBody;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub identity: IdentityService,
    pub polls: PollService,
    /// Take the anonymous-voter origin from `X-Forwarded-For` instead of the
    /// socket peer. Only safe behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Argon2 is deliberately slow; keep it off the async workers.
    let (user, token) =
        run_blocking(move || state.identity.register(&req.username, &req.password)).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            id: user.id,
            username: user.username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) =
        run_blocking(move || state.identity.authenticate(&req.username, &req.password)).await?;

    Ok(Json(AuthResponse {
        id: user.id,
        username: user.username,
        token,
    }))
}
