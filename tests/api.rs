use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tessera::email::LogEmailSender;
use tessera::engine::{Engine, EngineConfig};
use tessera::storage::MemoryStorage;
use tessera::token::{TokenMaker, KEY_LENGTH};
use tower::ServiceExt;

fn app() -> Result<Router> {
    let tokens = TokenMaker::new(
        &[5u8; KEY_LENGTH],
        time::Duration::minutes(15),
        time::Duration::days(1),
    )?;
    let engine = Engine::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(LogEmailSender),
        Arc::new(tokens),
        EngineConfig::default().with_bcrypt_cost(4),
    )?;
    Ok(tessera::api::router(Arc::new(engine)))
}

async fn post(app: &Router, uri: &str, body: &Value) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .header("User-Agent", "api-test")
                .header("X-Forwarded-For", "203.0.113.9")
                .body(Body::from(serde_json::to_vec(body)?))?,
        )
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

fn field<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("{pointer} missing in {value}"))
}

#[tokio::test]
async fn health_reports_storage_and_strategies() -> Result<()> {
    let response = app()?
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("X-App"));

    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["storage"], "ok");
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["strategies"], json!(["credentials", "personal_number", "noop"]));
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let response = app()?
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert!(body["paths"]["/v1/authenticate"].is_object());
    Ok(())
}

#[tokio::test]
async fn personal_number_flow_over_http() -> Result<()> {
    let app = app()?;

    let (status, registered) =
        post(&app, "/v1/register", &json!({"strategy": "personal_number"})).await?;
    assert_eq!(status, StatusCode::CREATED);
    let number = registered["number"]
        .as_u64()
        .ok_or_else(|| anyhow::anyhow!("no number in {registered}"))?;

    let (status, authenticated) = post(
        &app,
        "/v1/authenticate",
        &json!({"strategy": "personal_number", "number": number}),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let access = field(&authenticated, "/tokens/access_token")?.to_string();
    let refresh = field(&authenticated, "/tokens/refresh_token")?.to_string();

    let (status, claims) = post(&app, "/v1/verify", &json!({"token": access})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claims["identifier"], number.to_string());
    assert_eq!(claims["strategy"], "personal_number");
    assert_eq!(claims["class"], "access");

    let (status, refreshed) = post(&app, "/v1/refresh", &json!({"refresh_token": refresh})).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(field(&refreshed, "/access_token")?.starts_with("v4.local."));

    let (status, _) = post(&app, "/v1/revoke", &json!({"refresh_token": refresh})).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post(&app, "/v1/refresh", &json!({"refresh_token": refresh})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn errors_map_to_statuses() -> Result<()> {
    let app = app()?;

    let (status, _) = post(
        &app,
        "/v1/register",
        &json!({"strategy": "credentials", "email": "a@b.com", "password": "weak"}),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({"strategy": "credentials", "email": "a@b.com", "password": "Passw0rd"});
    let (status, identity) = post(&app, "/v1/register", &body).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(identity, json!({"strategy": "credentials", "email": "a@b.com"}));
    let (status, _) = post(&app, "/v1/register", &body).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post(
        &app,
        "/v1/authenticate",
        &json!({"strategy": "credentials", "email": "a@b.com", "password": "Passw0rD"}),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(
        &app,
        "/v1/authenticate",
        &json!({"strategy": "personal_number", "number": 1_000_000_000_000_000_u64}),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&app, "/v1/verify", &json!({"token": "v4.local.garbage"})).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post(&app, "/v1/verify-email", &json!({"token": "not/a-token"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/v1/register", &json!({"strategy": "oauth"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

async fn post_raw(
    app: &Router,
    uri: &str,
    content_type: &str,
    body: &str,
) -> Result<(StatusCode, String)> {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", content_type)
                .body(Body::from(body.to_string()))?,
        )
        .await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8(bytes.to_vec())?))
}

#[tokio::test]
async fn rejected_bodies_name_the_cause() -> Result<()> {
    let app = app()?;

    let (status, body) = post_raw(
        &app,
        "/v1/register",
        "application/json",
        r#"{"strategy": "oauth"}"#,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("Invalid payload"), "{body}");
    assert!(body.contains("unknown variant `oauth`"), "{body}");

    let (status, body) = post_raw(&app, "/v1/authenticate", "application/json", "{").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("Invalid payload"), "{body}");

    let (status, body) = post_raw(&app, "/v1/verify", "text/plain", "token").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Missing payload");
    Ok(())
}

#[tokio::test]
async fn noop_authentication_returns_identity_only() -> Result<()> {
    let app = app()?;
    let (status, body) = post(&app, "/v1/authenticate", &json!({"strategy": "noop"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"identity": {"strategy": "noop"}}));
    Ok(())
}
