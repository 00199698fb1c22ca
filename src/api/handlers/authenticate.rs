use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{client_meta, rejected_payload};
use crate::api::types::{AuthenticateResponse, IdentityResponse, StrategyRequest};
use crate::engine::Engine;

#[utoipa::path(
    post,
    path = "/v1/authenticate",
    request_body = StrategyRequest,
    responses(
        (status = 200, description = "Authenticated; tokens issued when the strategy has an identifier", body = AuthenticateResponse),
        (status = 400, description = "Invalid input or strategy not enabled", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 404, description = "Identity not found", body = String)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn authenticate(
    headers: HeaderMap,
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

    match engine.authenticate(kind, input, client_meta(&headers)).await {
        Ok(authenticated) => (
            StatusCode::OK,
            Json(AuthenticateResponse {
                identity: IdentityResponse::from(&authenticated.output),
                tokens: authenticated.tokens.map(Into::into),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
