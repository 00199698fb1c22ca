//! Token verification, refresh and revocation.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::rejected_payload;
use crate::api::types::{ClaimsResponse, RefreshRequest, RefreshResponse, TokenRequest};
use crate::engine::Engine;

/// Check an access token and return its claims. Sessions are not consulted.
#[utoipa::path(
    post,
    path = "/v1/verify",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = ClaimsResponse),
        (status = 401, description = "Token is invalid, expired or not an access token", body = String)
    ),
    tag = "tokens"
)]
#[instrument(skip_all)]
pub async fn verify(
    engine: Extension<Arc<Engine>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(rejection),
    };

    match engine.verify(request.token.trim()) {
        Ok(claims) => (StatusCode::OK, Json(ClaimsResponse::from(claims))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Refresh token invalid or session blocked", body = String),
        (status = 404, description = "Session not found", body = String)
    ),
    tag = "tokens"
)]
#[instrument(skip_all)]
pub async fn refresh(
    engine: Extension<Arc<Engine>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(rejection),
    };

    match engine.refresh(request.refresh_token.trim()).await {
        Ok(refreshed) => (StatusCode::OK, Json(RefreshResponse::from(refreshed))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/revoke",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Session blocked"),
        (status = 401, description = "Refresh token invalid", body = String),
        (status = 404, description = "Session not found", body = String)
    ),
    tag = "tokens"
)]
#[instrument(skip_all)]
pub async fn revoke(
    engine: Extension<Arc<Engine>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(rejection),
    };

    match engine.revoke(request.refresh_token.trim()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
