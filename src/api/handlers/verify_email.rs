use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::rejected_payload;
use crate::api::types::TokenRequest;
use crate::engine::Engine;

/// Consume the token from an emailed verification link.
#[utoipa::path(
    post,
    path = "/v1/verify-email",
    request_body = TokenRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Malformed token", body = String),
        (status = 404, description = "Unknown, expired or already used token", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    engine: Extension<Arc<Engine>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(rejection),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    match engine.confirm_verification(token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
