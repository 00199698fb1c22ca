//! HTTP adapter over [`Engine`].

pub mod handlers;
pub mod types;

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;

use crate::engine::Engine;
use handlers::{authenticate, health, register, tokens, verify_email};

const REQUEST_ID: &str = "x-request-id";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        authenticate::authenticate,
        tokens::verify,
        tokens::refresh,
        tokens::revoke,
        verify_email::verify_email,
    ),
    components(schemas(
        health::Health,
        types::StrategyRequest,
        types::IdentityResponse,
        types::TokensResponse,
        types::AuthenticateResponse,
        types::TokenRequest,
        types::RefreshRequest,
        types::ClaimsResponse,
        types::RefreshResponse,
        crate::strategy::StrategyKind,
    )),
    tags(
        (name = "auth", description = "Registration, authentication and email verification"),
        (name = "tokens", description = "Access token verification, refresh and revocation"),
        (name = "health", description = "Liveness and storage reachability"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// All routes with request id propagation and tracing; CORS is added by [`serve`].
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/openapi.json", get(|| async { Json(openapi()) }))
        .route("/v1/register", post(register::register))
        .route("/v1/authenticate", post(authenticate::authenticate))
        .route("/v1/verify", post(tokens::verify))
        .route("/v1/refresh", post(tokens::refresh))
        .route("/v1/revoke", post(tokens::revoke))
        .route("/v1/verify-email", post(verify_email::verify_email))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(engine)),
        )
}

/// Bind `port` and serve until ctrl-c.
///
/// # Errors
///
/// Returns an error if the frontend URL is invalid or the listener fails.
pub async fn serve(port: u16, engine: Arc<Engine>, frontend_base_url: &str) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin(frontend_base_url)?));

    let app = router(engine).layer(cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_drops_path() -> Result<()> {
        assert_eq!(
            frontend_origin("https://tessera.dev/app/")?,
            HeaderValue::from_static("https://tessera.dev")
        );
        assert_eq!(
            frontend_origin("http://localhost:8080/")?,
            HeaderValue::from_static("http://localhost:8080")
        );
        assert!(frontend_origin("not a url").is_err());
        Ok(())
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/register",
            "/v1/authenticate",
            "/v1/verify",
            "/v1/refresh",
            "/v1/revoke",
            "/v1/verify-email",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
