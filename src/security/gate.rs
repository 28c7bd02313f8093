//! Access gate for privileged admin routes.
//!
//! Flow Overview:
//! 1) Exempt paths pass straight through.
//! 2) HTTPS is enforced when configured.
//! 3) A principal must be attached and carry the admin role.
//! 4) The session is validated; a failing session is destroyed.
//! 5) Mutating requests pass the CSRF guard (carriers, then origin).
//! 6) The email authorization collaborator is consulted.
//! 7) The caller IP must be on the allow-list when one is configured.
//! 8) The session is touched, the request runs, and mutating requests get a
//!    fresh CSRF token.
//!
//! Every grant and deny is audited in the background.

use axum::{
    body::{to_bytes, Body},
    extract::{OriginalUri, Request, State},
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        request::Parts,
    },
    middleware::{self, Next},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use super::{
    authorization::{spawn_audit, AuditContext, AuditEntry, AuditOutcome, EmailAuthorizationService},
    cookies::{clear_session_cookie, cookie_value},
    csrf::{
        forwarded_proto, submitted_from_form, submitted_from_header, CsrfGuard, RequestOrigin,
        CSRF_COOKIE,
    },
    error::{deny_response, ClientStyle, GateError},
    principal::{ClientInfo, Principal},
    session::SessionManager,
};

const AUDIT_ACTION: &str = "admin_access";
const MAX_BUFFERED_FORM: usize = 1024 * 1024;

pub struct AccessGate {
    sessions: Arc<SessionManager>,
    csrf: CsrfGuard,
    authorization: Arc<dyn EmailAuthorizationService>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Outcome of a denied request, carried to the response builder.
struct Denial {
    error: GateError,
    principal: Option<Principal>,
    reason: String,
    destroy_session: bool,
}

impl Denial {
    fn new(error: GateError, principal: Option<&Principal>, reason: impl Into<String>) -> Self {
        Self {
            error,
            principal: principal.cloned(),
            reason: reason.into(),
            destroy_session: false,
        }
    }
}

impl AccessGate {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, authorization: Arc<dyn EmailAuthorizationService>) -> Self {
        let csrf = CsrfGuard::new(sessions.clone());
        Self {
            sessions,
            csrf,
            authorization,
        }
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    /// Wrap every route of `router` with the gate.
    pub fn protect<S>(self: Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(middleware::from_fn_with_state(self, access_gate))
    }

    async fn evaluate(
        &self,
        request: Request,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<(Request, Principal), Denial> {
        let config = self.sessions.config();

        if config.require_https() {
            let scheme = forwarded_proto(request.headers())
                .or_else(|| request.uri().scheme_str().map(str::to_ascii_lowercase));
            if scheme.as_deref() != Some("https") {
                return Err(Denial::new(
                    GateError::Forbidden("HTTPS required".to_string()),
                    None,
                    "plain HTTP request",
                ));
            }
        }

        let Some(principal) = request.extensions().get::<Principal>().cloned() else {
            return Err(Denial::new(GateError::Unauthenticated, None, "no principal"));
        };

        if !principal.user.is_admin() {
            return Err(Denial::new(
                GateError::Forbidden("admin role required".to_string()),
                Some(&principal),
                format!("role {} is not admin", principal.user.role),
            ));
        }

        if let Err(rejection) = self
            .sessions
            .check(&principal.session, &client.ip, &client.user_agent, now)
        {
            let mut denial = Denial::new(GateError::SessionInvalid, Some(&principal), rejection.to_string());
            denial.destroy_session = true;
            return Err(denial);
        }

        let request = if CsrfGuard::is_safe_method(request.method()) {
            request
        } else {
            self.check_csrf(request, &principal, now).await?
        };

        if config.require_email_authorization() {
            match self
                .authorization
                .check_email_authorization(&principal.user.email)
                .await
            {
                Ok(result) if result.authorized => {}
                Ok(result) => {
                    return Err(Denial::new(
                        GateError::Forbidden(result.reason.to_string()),
                        Some(&principal),
                        result.reason.to_string(),
                    ));
                }
                Err(err) => {
                    error!(email = %principal.user.email, "email authorization check failed: {err:#}");
                    return Err(Denial::new(
                        GateError::Forbidden("authorization unavailable".to_string()),
                        Some(&principal),
                        "authorization service error",
                    ));
                }
            }
        }

        if !config.ip_whitelist().allows(&client.ip) {
            return Err(Denial::new(
                GateError::Forbidden("IP address not allowed".to_string()),
                Some(&principal),
                format!("IP {} not on allow-list", client.ip),
            ));
        }

        Ok((request, principal))
    }

    async fn check_csrf(
        &self,
        request: Request,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Request, Denial> {
        let csrf_denial = |reason: String| {
            Denial::new(
                GateError::Forbidden("CSRF validation failed".to_string()),
                Some(principal),
                reason,
            )
        };

        // Only a form submission without the header is buffered.
        let (parts, body) = request.into_parts();
        let (submitted, body) = match submitted_from_header(&parts.headers) {
            Some(token) => (Some(token), body),
            None if is_form(&parts) => {
                let bytes = to_bytes(body, MAX_BUFFERED_FORM)
                    .await
                    .map_err(|err| csrf_denial(format!("unreadable form body: {err}")))?;
                (submitted_from_form(&bytes), Body::from(bytes))
            }
            None => (None, body),
        };
        let cookie = cookie_value(&parts.headers, CSRF_COOKIE);

        self.csrf
            .check_carriers(
                &principal.session.session_id,
                submitted.as_deref(),
                cookie.as_deref(),
                now,
            )
            .map_err(|err| csrf_denial(err.to_string()))?;

        let expected = RequestOrigin::from_request(
            &parts.headers,
            &parts.uri,
            self.sessions.config().require_https(),
        );
        self.csrf
            .check_origin(&parts.headers, expected.as_ref())
            .map_err(|err| csrf_denial(err.to_string()))?;

        Ok(Request::from_parts(parts, body))
    }

    fn audit(
        &self,
        ctx: AuditContext,
        principal: Option<&Principal>,
        outcome: AuditOutcome,
        details: String,
    ) {
        spawn_audit(
            self.authorization.clone(),
            AuditEntry {
                ctx,
                email: principal.map(|p| p.user.email.clone()).unwrap_or_default(),
                action: AUDIT_ACTION.to_string(),
                outcome,
                user_id: principal.map(|p| p.user.id),
                details,
            },
        );
    }
}

fn is_form(parts: &Parts) -> bool {
    parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

fn request_path(request: &Request) -> String {
    request
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| request.uri().path(), |OriginalUri(uri)| uri.path())
        .to_string()
}

#[instrument(skip_all, fields(path = tracing::field::Empty))]
async fn access_gate(State(gate): State<Arc<AccessGate>>, request: Request, next: Next) -> Response {
    let path = request_path(&request);
    tracing::Span::current().record("path", path.as_str());
    let config = gate.sessions.config();

    if config.is_exempt(&path) {
        return next.run(request).await;
    }

    let now = Utc::now();
    let client = request
        .extensions()
        .get::<ClientInfo>()
        .cloned()
        .unwrap_or_else(|| ClientInfo::from_request(&request, config.trusted_proxies()));
    let style = ClientStyle::detect(request.headers(), &path);
    let is_mutating = !CsrfGuard::is_safe_method(request.method());
    let ctx = AuditContext {
        request_id: request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip_address: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        method: request.method().to_string(),
        path: path.clone(),
    };

    match gate.evaluate(request, &client, now).await {
        Ok((request, principal)) => {
            gate.sessions
                .touch(&principal.session.session_id, &client.ip, &client.user_agent, now);
            debug!(user = %principal.user.username, "admin request admitted");
            gate.audit(ctx, Some(&principal), AuditOutcome::Granted, "admitted".to_string());

            let mut response = next.run(request).await;
            if is_mutating {
                match gate.csrf.rotate(&principal.session.session_id, Utc::now()) {
                    Ok(Some(token)) => match gate.csrf.cookie(&token) {
                        Ok(cookie) => {
                            response.headers_mut().append(SET_COOKIE, cookie);
                        }
                        Err(err) => error!("failed to build CSRF cookie: {err}"),
                    },
                    Ok(None) => {}
                    Err(err) => error!("failed to rotate CSRF token: {err:#}"),
                }
            }
            response
        }
        Err(denial) => {
            warn!(
                user = denial.principal.as_ref().map_or("<anonymous>", |p| p.user.username.as_str()),
                reason = %denial.reason,
                "admin request denied"
            );
            if denial.destroy_session {
                if let Some(principal) = &denial.principal {
                    gate.sessions.invalidate(&principal.session.session_id);
                }
            }
            gate.audit(ctx, denial.principal.as_ref(), AuditOutcome::Denied, denial.reason.clone());

            let secure = config.require_https();
            let mut response = deny_response(&denial.error, style, config.failure_redirect(), secure);
            if denial.destroy_session {
                if let Ok(cookie) = clear_session_cookie(secure) {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
            }
            response
        }
    }
}
