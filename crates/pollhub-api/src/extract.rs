use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use pollhub_core::{Fingerprint, PollError, UserRef, Voter};

use crate::auth::AppState;
use crate::error::ApiError;

/// Caller with a valid bearer token. Rejects with 401 otherwise.
pub struct AuthUser(pub UserRef);

/// Caller with an optional bearer token. A token that is present but invalid
/// is still a 401, never a silent downgrade to anonymous.
pub struct MaybeUser(pub Option<UserRef>);

/// JSON request body whose rejections (bad syntax, wrong types, missing
/// content type) render as a 400 `{"message": ...}` like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// The identity a vote is recorded under: the token's user if there is one,
/// otherwise a fingerprint of the caller's network origin.
pub struct CallerVoter(pub Voter);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(AuthUser).ok_or_else(|| PollError::Unauthenticated.into())
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state).await {
            Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_string(),
            Err(rejection) if rejection.is_missing() => return Ok(MaybeUser(None)),
            Err(_) => return Err(PollError::Unauthenticated.into()),
        };

        let user = state.identity.resolve(&token).inspect_err(|_| {
            warn!("Rejected bearer token on {}", parts.uri.path());
        })?;
        Ok(MaybeUser(Some(user)))
    }
}

impl FromRequestParts<AppState> for CallerVoter {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let MaybeUser(Some(user)) = MaybeUser::from_request_parts(parts, state).await? {
            return Ok(CallerVoter(Voter::User(user.id)));
        }

        let origin = if state.trust_proxy {
            forwarded_for(&parts.headers)
        } else {
            None
        };
        let origin = origin
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(ApiError::UnknownOrigin)?;

        Ok(CallerVoter(Voter::Anonymous(Fingerprint::from_ip(origin))))
    }
}

/// First hop of `X-Forwarded-For`, i.e. the client as seen by the outermost
/// proxy.
fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}
