//! Admin login and logout.
//!
//! Flow Overview:
//! 1) The submitted login is resolved to its account email, and a locked
//!    account is refused before credentials are checked.
//! 2) Bad credentials count toward the lockout for that account.
//! 3) Only admins whose email is authorized get a session.
//! 4) Success clears the failure history, creates the session, and issues the
//!    session and CSRF cookies.

use axum::{
    extract::{Extension, Form, Request, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::json_error;
use crate::{
    api::AppState,
    security::{
        authorization::{spawn_audit, AuditEntry},
        cookies::{clear_session_cookie, cookie_value, session_cookie, FLASH_COOKIE},
        error::{deny_response, ClientStyle},
        AuditContext, AuditOutcome, AuthMethod, ClientInfo, GateError, Principal, User,
    },
};

const LOGIN_ACTION: &str = "admin_login";

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub username: String,
    pub csrf_token: String,
    pub expires_in: u64,
}

/// Failure page target; echoes the flash message left by a denied request.
pub async fn login_page(headers: HeaderMap) -> impl IntoResponse {
    let message = cookie_value(&headers, FLASH_COOKIE).map(|raw| {
        url::form_urlencoded::parse(format!("m={raw}").as_bytes())
            .next()
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default()
    });
    Json(serde_json::json!({ "login_required": true, "message": message }))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Extension(client): Extension<ClientInfo>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let config = state.sessions.config();
    let style = ClientStyle::detect(&headers, "/login");
    let secure = config.require_https();
    let deny = |err: GateError| deny_response(&err, style, config.failure_redirect(), secure);
    let identifier = form.username.trim();
    let now = Utc::now();
    let lockouts = state.sessions.lockouts();

    let ctx = AuditContext {
        request_id: headers
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        method: "POST".to_string(),
        path: "/login".to_string(),
    };
    let audit = |user: Option<&User>, outcome: AuditOutcome, details: &str| {
        spawn_audit(
            state.authorization.clone(),
            AuditEntry {
                ctx: ctx.clone(),
                email: user.map_or_else(|| identifier.to_string(), |u| u.email.clone()),
                action: LOGIN_ACTION.to_string(),
                outcome,
                user_id: user.map(|u| u.id),
                details: details.to_string(),
            },
        );
    };

    // Aliases of one account share a single failure counter.
    let lockout_key = match state.users.find_user(identifier).await {
        Ok(Some(user)) => user.email,
        Ok(None) => identifier.to_string(),
        Err(err) => {
            error!("user directory failed during login: {err:#}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login unavailable");
        }
    };

    if let Some(remaining) = lockouts
        .is_locked(&lockout_key, now)
        .then(|| lockouts.remaining(&lockout_key, now))
    {
        warn!(identifier = %lockout_key, "login refused: identifier locked out");
        audit(None, AuditOutcome::Denied, "locked out");
        return deny(GateError::LockedOut {
            remaining_seconds: remaining.map_or(0, |left| left.as_secs()),
        });
    }

    let user = match state.users.authenticate(identifier, &form.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let locked = lockouts.record_failure(&lockout_key, now);
            audit(None, AuditOutcome::Denied, "invalid credentials");
            if locked {
                let remaining = lockouts.remaining(&lockout_key, now).map_or(0, |left| left.as_secs());
                return deny(GateError::LockedOut {
                    remaining_seconds: remaining,
                });
            }
            return deny(GateError::Unauthenticated);
        }
        Err(err) => {
            error!("user directory failed during login: {err:#}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login unavailable");
        }
    };

    if !user.is_admin() {
        audit(Some(&user), AuditOutcome::Denied, "not an admin");
        return deny(GateError::Forbidden("admin role required".to_string()));
    }

    if config.require_email_authorization() {
        match state.authorization.check_email_authorization(&user.email).await {
            Ok(result) if result.authorized => {}
            Ok(result) => {
                audit(Some(&user), AuditOutcome::Denied, &result.reason.to_string());
                return deny(GateError::Forbidden(result.reason.to_string()));
            }
            Err(err) => {
                error!(email = %user.email, "email authorization check failed: {err:#}");
                audit(Some(&user), AuditOutcome::Denied, "authorization service error");
                return deny(GateError::Forbidden("authorization unavailable".to_string()));
            }
        }
    }

    lockouts.clear(&lockout_key);

    let session = match state.sessions.create_session(
        user.id,
        &user.username,
        AuthMethod::Local,
        &client.ip,
        &client.user_agent,
    ) {
        Ok(session) => session,
        Err(err) => {
            error!("failed to create admin session: {err:#}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login unavailable");
        }
    };

    let csrf_token = match state.gate.csrf().generate(&session.session_id, now) {
        Ok(Some(token)) => token,
        Ok(None) | Err(_) => {
            error!(session_id = %session.session_id, "failed to issue CSRF token");
            state.sessions.invalidate(&session.session_id);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login unavailable");
        }
    };

    let max_age = config.session_timeout().as_secs();
    let mut response_headers = HeaderMap::new();
    match (
        session_cookie(&session.handle().to_cookie_value(), max_age, secure),
        state.gate.csrf().cookie(&csrf_token),
    ) {
        (Ok(session_value), Ok(csrf_value)) => {
            response_headers.append(SET_COOKIE, session_value);
            response_headers.append(SET_COOKIE, csrf_value);
        }
        _ => {
            error!("failed to build login cookies");
            state.sessions.invalidate(&session.session_id);
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "login unavailable");
        }
    }

    info!(user = %user.username, "admin logged in");
    audit(Some(&user), AuditOutcome::Granted, "session created");

    let body = LoginResponse {
        success: true,
        username: user.username,
        csrf_token,
        expires_in: max_age,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

/// End the caller's session.
///
/// `/logout` is exempt from the gate and takes no CSRF token. A cross-site
/// POST cannot log anyone out because the session cookie is `SameSite=Strict`
/// and is never attached to it.
pub async fn logout(State(state): State<AppState>, request: Request) -> impl IntoResponse {
    if let Some(principal) = request.extensions().get::<Principal>() {
        state.sessions.invalidate(&principal.session.session_id);
        info!(user = %principal.user.username, "admin logged out");
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.sessions.config().require_https()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(serde_json::json!({ "success": true })),
    )
}
