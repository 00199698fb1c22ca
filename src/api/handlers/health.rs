use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::engine::Engine;
use crate::strategy::StrategyKind;
use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    pub commit: String,
    pub name: String,
    pub version: String,
    pub storage: String,
    pub strategies: Vec<StrategyKind>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Storage is reachable", body = Health),
        (status = 503, description = "Storage is unreachable", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(engine: Extension<Arc<Engine>>) -> impl IntoResponse {
    let storage = engine.ping().await;
    if let Err(err) = &storage {
        error!("Storage health check failed: {err}");
    }

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: if storage.is_ok() { "ok" } else { "error" }.to_string(),
        strategies: engine.enabled_strategies(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            debug!("X-App header: {:?}", value);
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    let status = if storage.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, headers, Json(health))
}
