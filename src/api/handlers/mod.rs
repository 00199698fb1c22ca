//! Route handlers and the helpers they share.

pub mod authenticate;
pub mod health;
pub mod register;
pub mod tokens;
pub mod verify_email;

use axum::{
    extract::rejection::JsonRejection,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::engine::ClientMeta;
use crate::error::{Code, Error};

const UNKNOWN: &str = "unknown";

#[must_use]
pub fn status_for(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(self.code());
        if status.is_server_error() {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        (status, self.public_message()).into_response()
    }
}

/// 400 naming why the JSON body was refused.
pub(crate) fn rejected_payload(rejection: JsonRejection) -> Response {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "Missing payload".to_string(),
        other => format!("Invalid payload: {}", other.body_text()),
    };
    debug!("{message}");
    (StatusCode::BAD_REQUEST, message).into_response()
}

/// Extract the client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        client_ip: extract_client_ip(headers).unwrap_or_else(|| UNKNOWN.to_string()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(UNKNOWN)
            .to_string(),
    }
}
