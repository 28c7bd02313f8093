//! Policy knobs for sessions, lockouts, CSRF and the access gate.

use chrono::TimeDelta;
use std::time::Duration;

use super::ip::IpAllowList;

const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);
const DEFAULT_CSRF_TOKEN_LENGTH: usize = 32;
const DEFAULT_TOKEN_EXPIRY: Duration = Duration::from_secs(4 * 60 * 60);
const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_FAILURE_REDIRECT: &str = "/login";
const MIN_CSRF_TOKEN_LENGTH: usize = 16;

/// Path prefixes the gate never intercepts.
pub const DEFAULT_EXEMPT_PATHS: [&str; 5] = [
    "/login",
    "/logout",
    "/static/",
    "/health",
    "/auth/oauth/callback",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid IP allow-list entry: {0}")]
    InvalidIpEntry(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("CSRF token length must be at least {MIN_CSRF_TOKEN_LENGTH} bytes, got {0}")]
    CsrfTokenTooShort(usize),
    #[error("exempt path must start with '/': {0}")]
    ExemptPath(String),
}

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    session_timeout: Duration,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    require_email_authorization: bool,
    ip_whitelist: IpAllowList,
    trusted_proxies: IpAllowList,
    enforce_session_binding: bool,
    rebind_on_touch: bool,
    csrf_token_length: usize,
    token_expiry: Duration,
    require_https: bool,
    double_submit: bool,
    header_validation: bool,
    exempt_paths: Vec<String>,
    failure_redirect: String,
    reap_interval: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            require_email_authorization: true,
            ip_whitelist: IpAllowList::default(),
            trusted_proxies: IpAllowList::default(),
            enforce_session_binding: true,
            rebind_on_touch: true,
            csrf_token_length: DEFAULT_CSRF_TOKEN_LENGTH,
            token_expiry: DEFAULT_TOKEN_EXPIRY,
            require_https: false,
            double_submit: true,
            header_validation: true,
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(ToString::to_string).collect(),
            failure_redirect: DEFAULT_FAILURE_REDIRECT.to_string(),
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    #[must_use]
    pub fn with_require_email_authorization(mut self, required: bool) -> Self {
        self.require_email_authorization = required;
        self
    }

    #[must_use]
    pub fn with_ip_whitelist(mut self, whitelist: IpAllowList) -> Self {
        self.ip_whitelist = whitelist;
        self
    }

    /// Peers whose `X-Forwarded-For`/`X-Real-IP` headers are believed. With
    /// none configured the socket peer is always the client address.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: IpAllowList) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    #[must_use]
    pub fn with_enforce_session_binding(mut self, enforce: bool) -> Self {
        self.enforce_session_binding = enforce;
        self
    }

    /// Re-record IP and User-Agent on every touch. Tolerates clients whose
    /// address changes behind proxies, at the cost of binding only against the
    /// previous request rather than the login request.
    #[must_use]
    pub fn with_rebind_on_touch(mut self, rebind: bool) -> Self {
        self.rebind_on_touch = rebind;
        self
    }

    #[must_use]
    pub fn with_csrf_token_length(mut self, length: usize) -> Self {
        self.csrf_token_length = length;
        self
    }

    #[must_use]
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    #[must_use]
    pub fn with_require_https(mut self, required: bool) -> Self {
        self.require_https = required;
        self
    }

    #[must_use]
    pub fn with_double_submit(mut self, enabled: bool) -> Self {
        self.double_submit = enabled;
        self
    }

    #[must_use]
    pub fn with_header_validation(mut self, enabled: bool) -> Self {
        self.header_validation = enabled;
        self
    }

    #[must_use]
    pub fn with_exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.exempt_paths = paths;
        self
    }

    #[must_use]
    pub fn with_failure_redirect(mut self, redirect: String) -> Self {
        self.failure_redirect = redirect;
        self
    }

    #[must_use]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Reject configurations that would disable a protection by accident.
    ///
    /// # Errors
    /// Returns the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_timeout.is_zero() {
            return Err(ConfigError::Zero("session timeout"));
        }
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::Zero("max failed attempts"));
        }
        if self.lockout_duration.is_zero() {
            return Err(ConfigError::Zero("lockout duration"));
        }
        if self.token_expiry.is_zero() {
            return Err(ConfigError::Zero("CSRF token expiry"));
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Zero("reap interval"));
        }
        if self.csrf_token_length < MIN_CSRF_TOKEN_LENGTH {
            return Err(ConfigError::CsrfTokenTooShort(self.csrf_token_length));
        }
        if let Some(path) = self.exempt_paths.iter().find(|path| !path.starts_with('/')) {
            return Err(ConfigError::ExemptPath(path.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    #[must_use]
    pub fn require_email_authorization(&self) -> bool {
        self.require_email_authorization
    }

    #[must_use]
    pub fn ip_whitelist(&self) -> &IpAllowList {
        &self.ip_whitelist
    }

    #[must_use]
    pub fn trusted_proxies(&self) -> &IpAllowList {
        &self.trusted_proxies
    }

    #[must_use]
    pub fn enforce_session_binding(&self) -> bool {
        self.enforce_session_binding
    }

    #[must_use]
    pub fn rebind_on_touch(&self) -> bool {
        self.rebind_on_touch
    }

    #[must_use]
    pub fn csrf_token_length(&self) -> usize {
        self.csrf_token_length
    }

    #[must_use]
    pub fn token_expiry(&self) -> Duration {
        self.token_expiry
    }

    #[must_use]
    pub fn require_https(&self) -> bool {
        self.require_https
    }

    #[must_use]
    pub fn double_submit(&self) -> bool {
        self.double_submit
    }

    #[must_use]
    pub fn header_validation(&self) -> bool {
        self.header_validation
    }

    #[must_use]
    pub fn exempt_paths(&self) -> &[String] {
        &self.exempt_paths
    }

    #[must_use]
    pub fn failure_redirect(&self) -> &str {
        &self.failure_redirect
    }

    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        self.reap_interval
    }

    /// Whether `path` falls under one of the exempt prefixes.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|prefix| {
            let base = prefix.trim_end_matches('/');
            path == base || path.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Convert a configured duration for timestamp arithmetic, saturating instead
/// of failing on absurdly large values.
pub(crate) fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
