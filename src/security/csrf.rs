//! Double-submit CSRF protection for admin sessions.
//!
//! Flow Overview:
//! 1) A session obtains a token through `generate`; the page embeds it and the
//!    browser also receives it as the `admin_csrf_token` cookie.
//! 2) A mutating request must present the same value in the header or form
//!    field, in the cookie, and in the session.
//! 3) With header validation on, `Origin`/`Referer` must name this host.
//! 4) After the request is admitted the token is rotated.
//!
//! Concurrent rotations on one session resolve last-write-wins; a request that
//! raced a rotation fails and the client refetches a token.

use anyhow::Result;
use axum::http::{
    header::{InvalidHeaderValue, HOST, ORIGIN, REFERER},
    HeaderMap, HeaderValue, Method, Uri,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use url::Url;

use super::{
    config::delta,
    secure::{constant_time_str_eq, random_token},
    session::SessionManager,
};

pub const CSRF_HEADER: &str = "x-admin-csrf-token";
pub const CSRF_FIELD: &str = "admin_csrf_token";
pub const CSRF_COOKIE: &str = "admin_csrf_token";

#[derive(Clone, PartialEq, Eq)]
pub struct CsrfState {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl CsrfState {
    #[must_use]
    pub fn new(token: String, issued_at: DateTime<Utc>) -> Self {
        Self { token, issued_at }
    }

    fn is_expired(&self, now: DateTime<Utc>, expiry: std::time::Duration) -> bool {
        now.signed_duration_since(self.issued_at) > delta(expiry)
    }
}

impl fmt::Debug for CsrfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfState")
            .field("token", &"***")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CsrfError {
    #[error("session has no CSRF token")]
    MissingSessionToken,
    #[error("CSRF token expired")]
    Expired,
    #[error("CSRF token not submitted")]
    MissingSubmitted,
    #[error("CSRF cookie missing")]
    MissingCookie,
    #[error("CSRF token mismatch")]
    Mismatch,
    #[error("request has neither Origin nor Referer")]
    MissingOrigin,
    #[error("request origin does not match host")]
    OriginMismatch,
}

/// Scheme, host and port a request was addressed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl RequestOrigin {
    /// Derive the origin from `Host` plus `X-Forwarded-Proto`, the URI scheme,
    /// or `https_default` when neither names a scheme.
    #[must_use]
    pub fn from_request(headers: &HeaderMap, uri: &Uri, https_default: bool) -> Option<Self> {
        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or_else(|| uri.authority().map(|authority| authority.as_str()))?;
        let fallback = if https_default { "https" } else { "http" };
        let scheme = forwarded_proto(headers)
            .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| fallback.to_string());
        let url = Url::parse(&format!("{scheme}://{host}")).ok()?;
        Self::from_url(&url)
    }

    fn from_url(url: &Url) -> Option<Self> {
        Some(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }

    #[must_use]
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    fn matches(&self, candidate: &str) -> bool {
        Url::parse(candidate.trim())
            .ok()
            .and_then(|url| Self::from_url(&url))
            .is_some_and(|origin| &origin == self)
    }
}

/// First value of `X-Forwarded-Proto`, lowercased.
#[must_use]
pub fn forwarded_proto(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
}

#[derive(Clone, Debug)]
pub struct CsrfGuard {
    sessions: Arc<SessionManager>,
}

impl CsrfGuard {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// GET, HEAD, OPTIONS and TRACE never need a token.
    #[must_use]
    pub fn is_safe_method(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }

    /// Return the session's unexpired token, minting one if needed.
    /// `None` when the session does not exist.
    ///
    /// # Errors
    /// Returns an error if random generation fails.
    pub fn generate(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let expiry = self.sessions.config().token_expiry();
        match self.sessions.csrf_state(session_id) {
            None => Ok(None),
            Some(Some(state)) if !state.is_expired(now, expiry) => Ok(Some(state.token)),
            Some(_) => self.rotate(session_id, now),
        }
    }

    /// Replace the session's token unconditionally.
    ///
    /// # Errors
    /// Returns an error if random generation fails.
    pub fn rotate(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let token = random_token(self.sessions.config().csrf_token_length())?;
        let stored = self
            .sessions
            .set_csrf_state(session_id, CsrfState::new(token.clone(), now));
        Ok(stored.then_some(token))
    }

    /// Constant-time comparison against the session's unexpired token.
    #[must_use]
    pub fn verify(&self, session_id: &str, candidate: &str, now: DateTime<Utc>) -> bool {
        self.session_token(session_id, now)
            .is_ok_and(|token| !candidate.is_empty() && constant_time_str_eq(&token, candidate))
    }

    /// Require the session, submitted and cookie carriers to agree.
    /// The cookie is skipped when double-submit is off.
    ///
    /// # Errors
    /// Returns the first failing carrier check.
    pub fn check_carriers(
        &self,
        session_id: &str,
        submitted: Option<&str>,
        cookie: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CsrfError> {
        let expected = self.session_token(session_id, now)?;
        let submitted = submitted
            .filter(|value| !value.is_empty())
            .ok_or(CsrfError::MissingSubmitted)?;
        if !constant_time_str_eq(&expected, submitted) {
            return Err(CsrfError::Mismatch);
        }
        if self.sessions.config().double_submit() {
            let cookie = cookie
                .filter(|value| !value.is_empty())
                .ok_or(CsrfError::MissingCookie)?;
            if !constant_time_str_eq(&expected, cookie) {
                return Err(CsrfError::Mismatch);
            }
        }
        Ok(())
    }

    /// Every present `Origin`/`Referer` must match `expected`, and at least
    /// one must be present. No-op when header validation is off.
    ///
    /// # Errors
    /// Returns `MissingOrigin` or `OriginMismatch`.
    pub fn check_origin(
        &self,
        headers: &HeaderMap,
        expected: Option<&RequestOrigin>,
    ) -> Result<(), CsrfError> {
        if !self.sessions.config().header_validation() {
            return Ok(());
        }
        let values: Vec<&str> = [ORIGIN, REFERER]
            .iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .collect();
        if values.is_empty() {
            return Err(CsrfError::MissingOrigin);
        }
        let expected = expected.ok_or(CsrfError::OriginMismatch)?;
        if values.iter().all(|value| expected.matches(value)) {
            Ok(())
        } else {
            Err(CsrfError::OriginMismatch)
        }
    }

    /// Script-readable cookie carrying the token.
    ///
    /// # Errors
    /// Returns an error if the token contains bytes not allowed in a header.
    pub fn cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict");
        if self.sessions.config().require_https() {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    fn session_token(&self, session_id: &str, now: DateTime<Utc>) -> Result<String, CsrfError> {
        let state = self
            .sessions
            .csrf_state(session_id)
            .flatten()
            .ok_or(CsrfError::MissingSessionToken)?;
        if state.is_expired(now, self.sessions.config().token_expiry()) {
            return Err(CsrfError::Expired);
        }
        Ok(state.token)
    }
}

/// Token from the `X-Admin-CSRF-Token` header.
#[must_use]
pub fn submitted_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Token from an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn submitted_from_form(body: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == CSRF_FIELD)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
