use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::rejected_payload;
use crate::api::types::{IdentityResponse, StrategyRequest};
use crate::engine::Engine;

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = StrategyRequest,
    responses(
        (status = 201, description = "Identity registered", body = IdentityResponse),
        (status = 400, description = "Invalid input or strategy not enabled", body = String),
        (status = 409, description = "Identity already exists", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    engine: Extension<Arc<Engine>>,
    payload: Result<Json<StrategyRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(rejection),
    };

    let (kind, input) = match request.into_input() {
        Ok(parts) => parts,
        Err(err) => return err.into_response(),
    };

    match engine.register(kind, input).await {
        Ok(output) => (
            StatusCode::CREATED,
            Json(IdentityResponse::from(&output)),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
