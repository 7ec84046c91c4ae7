use axum::{
    Router,
    routing::{get, post},
};

use crate::auth::{self, AppState};
use crate::polls;

/// All pollhub routes, served both at the root and under `/api`.
/// Layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/polls", get(polls::list_polls).post(polls::create_poll))
        .route("/polls/my-polls", get(polls::my_polls))
        .route("/polls/{id}", get(polls::get_poll).delete(polls::delete_poll))
        .route("/polls/{id}/vote", post(polls::vote))
        .route(
            "/polls/{id}/add-option",
            post(polls::add_option).put(polls::add_option),
        )
        .with_state(state);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(api.clone())
        .nest("/api", api)
}
