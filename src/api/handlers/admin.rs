//! Privileged routes. Everything here runs behind the access gate, so a
//! [`Principal`] with a validated session is always attached.

use axum::{
    extract::{Extension, Form, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::json_error;
use crate::{api::AppState, security::Principal};

#[derive(Serialize, Deserialize, Debug)]
pub struct Dashboard {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub auth_method: String,
    pub active_sessions: usize,
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Json<Dashboard> {
    Json(Dashboard {
        user_id: principal.user.id.to_string(),
        username: principal.user.username,
        email: principal.user.email,
        auth_method: principal.auth_method.to_string(),
        active_sessions: state.sessions.len(),
    })
}

/// Current CSRF token for the caller's session, also re-issued as a cookie.
pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Response {
    let csrf = state.gate.csrf();
    let token = match csrf.generate(&principal.session.session_id, Utc::now()) {
        Ok(Some(token)) => token,
        Ok(None) => return json_error(StatusCode::UNAUTHORIZED, "session invalid or expired"),
        Err(err) => {
            error!("failed to generate CSRF token: {err:#}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "CSRF token unavailable");
        }
    };

    let mut headers = HeaderMap::new();
    match csrf.cookie(&token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("failed to build CSRF cookie: {err}"),
    }
    (
        StatusCode::OK,
        headers,
        Json(serde_json::json!({ "success": true, "csrf_token": token })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct RevokeForm {
    pub session_id: String,
}

/// Terminate one of the caller's own sessions.
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Form(form): Form<RevokeForm>,
) -> Response {
    let owned = state
        .sessions
        .get(&form.session_id)
        .is_some_and(|session| session.user_id == principal.user.id);
    if !owned {
        return json_error(StatusCode::NOT_FOUND, "session not found");
    }

    state.sessions.invalidate(&form.session_id);
    info!(user = %principal.user.username, "admin session revoked");
    Json(serde_json::json!({
        "success": true,
        "current": form.session_id == principal.session.session_id,
    }))
    .into_response()
}
