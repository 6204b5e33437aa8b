//! Request extractors.
//!
//! Each extractor rejects with an [`ApiErrorResponse`] so clients always get
//! the JSON error body, whichever part of the request was wrong.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request, rejection::JsonRejection},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;

use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::application::parse_authorization;
use crate::domain::{TaskId, UserId, UserSummary};

// =============================================================================
// Path Identifiers
// =============================================================================

/// Task id taken from the `{id}` path segment. Malformed ids are a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskIdParam(pub TaskId);

impl<S> FromRequestParts<S> for TaskIdParam
where
    S: Send + Sync,
{
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = path_segment(parts, state).await?;
        raw.parse().map(Self).map_err(|_| {
            ApiErrorResponse::bad_request("INVALID_ID", format!("Invalid task id '{raw}'"))
        })
    }
}

/// User id taken from the `{id}` path segment. Malformed ids are a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdParam(pub UserId);

impl<S> FromRequestParts<S> for UserIdParam
where
    S: Send + Sync,
{
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let raw = path_segment(parts, state).await?;
        raw.parse().map(Self).map_err(|_| {
            ApiErrorResponse::bad_request("INVALID_ID", format!("Invalid user id '{raw}'"))
        })
    }
}

async fn path_segment<S>(parts: &mut Parts, state: &S) -> Result<String, ApiErrorResponse>
where
    S: Send + Sync,
{
    Path::<String>::from_request_parts(parts, state)
        .await
        .map(|Path(raw)| raw)
        .map_err(|rejection| ApiErrorResponse::bad_request("INVALID_PATH", rejection.body_text()))
}

// =============================================================================
// Authentication
// =============================================================================

/// The acting user, resolved from `Authorization: Token <token>`.
///
/// Missing or malformed headers and unknown tokens are rejected with 401
/// and a `WWW-Authenticate: Token` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserSummary);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_authorization)
            .ok_or_else(|| {
                ApiErrorResponse::unauthorized("A valid Authorization header is required")
            })?;

        let user = state
            .authenticator
            .resolve(token)
            .await?
            .ok_or_else(|| ApiErrorResponse::unauthorized("Unknown token"))?;
        Ok(Self(user))
    }
}

// =============================================================================
// JSON Bodies
// =============================================================================

/// `Json` that rejects malformed bodies with the standard error body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErrorResponse;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(request, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection: JsonRejection| {
                ApiErrorResponse::bad_request("INVALID_JSON", rejection.body_text())
            })
    }
}
