//! Deny taxonomy and its translation into HTTP responses.

use axum::{
    http::{
        header::{ACCEPT, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::cookies::flash_cookie;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("access denied: {0}")]
    Forbidden(String),
    #[error("session invalid or expired")]
    SessionInvalid,
    #[error("service credential invalid")]
    CredentialInvalid,
    #[error("too many failed attempts; try again in {remaining_seconds} seconds")]
    LockedOut { remaining_seconds: u64 },
}

impl GateError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::SessionInvalid | Self::CredentialInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) | Self::LockedOut { .. } => StatusCode::FORBIDDEN,
        }
    }
}

/// How a denied client should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStyle {
    Browser,
    Api,
}

impl ClientStyle {
    /// JSON `Accept` or an `/api/` path means an API client.
    #[must_use]
    pub fn detect(headers: &HeaderMap, path: &str) -> Self {
        let wants_json = headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("json"));
        if wants_json || path == "/api" || path.starts_with("/api/") {
            Self::Api
        } else {
            Self::Browser
        }
    }
}

/// Render a deny. Browsers are redirected to `failure_redirect` with a flash
/// cookie; API clients get a JSON body with the mapped status.
#[must_use]
pub fn deny_response(
    err: &GateError,
    style: ClientStyle,
    failure_redirect: &str,
    secure_cookies: bool,
) -> Response {
    let message = err.to_string();
    match style {
        ClientStyle::Api => (
            err.status(),
            Json(json!({ "success": false, "message": message })),
        )
            .into_response(),
        ClientStyle::Browser => {
            let mut headers = HeaderMap::new();
            let location = HeaderValue::from_str(failure_redirect)
                .unwrap_or_else(|_| HeaderValue::from_static("/login"));
            headers.insert(LOCATION, location);
            if let Ok(cookie) = flash_cookie(&message, secure_cookies) {
                headers.append(SET_COOKIE, cookie);
            }
            (StatusCode::SEE_OTHER, headers).into_response()
        }
    }
}
