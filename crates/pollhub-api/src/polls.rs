use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use pollhub_core::PollError;
use pollhub_types::api::{
    AddOptionRequest, CreatePollRequest, MessageResponse, OptionInput, PollResponse, VoteRequest,
    VoteResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::extract::{AuthUser, CallerVoter, JsonBody};

/// A path segment that is not a UUID cannot name an existing poll.
fn parse_poll_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| PollError::NotFound.into())
}

fn project(polls: &[pollhub_core::Poll]) -> Vec<PollResponse> {
    polls.iter().map(PollResponse::from).collect()
}

/// GET /polls
pub async fn list_polls(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let polls = run_blocking(move || state.polls.list_all()).await?;
    Ok(Json(project(&polls)))
}

/// GET /polls/my-polls
pub async fn my_polls(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let polls = run_blocking(move || state.polls.list_owned_by(&user)).await?;
    Ok(Json(project(&polls)))
}

/// GET /polls/{id}
pub async fn get_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_poll_id(&id)?;
    let poll = run_blocking(move || state.polls.get(id)).await?;
    Ok(Json(PollResponse::from(&poll)))
}

/// POST /polls
pub async fn create_poll(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let options: Vec<String> = req.options.into_iter().map(OptionInput::into_text).collect();
    let poll = run_blocking(move || state.polls.create(&user, &req.question, &options)).await?;
    Ok((StatusCode::CREATED, Json(PollResponse::from(&poll))))
}

/// POST /polls/{id}/vote. Open to anonymous callers.
pub async fn vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    CallerVoter(voter): CallerVoter,
    JsonBody(req): JsonBody<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_poll_id(&id)?;
    let poll = run_blocking(move || state.polls.vote(id, req.option_index, &voter)).await?;

    Ok(Json(VoteResponse {
        message: "Vote recorded successfully.".into(),
        poll: PollResponse::from(&poll),
    }))
}

/// PUT or POST /polls/{id}/add-option. Creator only.
pub async fn add_option(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<AddOptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_poll_id(&id)?;
    let poll =
        run_blocking(move || state.polls.add_option(id, &user, &req.new_option_text)).await?;
    Ok(Json(PollResponse::from(&poll)))
}

/// DELETE /polls/{id}. Creator only.
pub async fn delete_poll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_poll_id(&id)?;
    run_blocking(move || state.polls.delete(id, &user)).await?;
    Ok(Json(MessageResponse::new("Poll removed successfully.")))
}
