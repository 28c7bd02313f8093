//! Admin session registry.
//!
//! Flow Overview:
//! 1) `create_session` mints a lookup identifier and a separate bearer secret.
//! 2) The browser holds both in the `admin_session` cookie as `<id>.<token>`.
//! 3) Every privileged request calls `check` (token, idle timeout, binding,
//!    admin marker) and, once admitted, `touch`.
//! 4) Logout, binding mismatch, or the reaper removes the session.
//!
//! Security boundaries:
//! - Session tokens are compared in constant time and never logged.
//! - The registry lock is held only to read or mutate the map; token
//!   generation and comparison happen outside it.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{hash_map::Entry, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    config::{delta, SecurityConfig},
    csrf::CsrfState,
    lockout::LockoutTracker,
    secure::{constant_time_str_eq, random_token},
};

const SESSION_ID_BYTES: usize = 32;
const SESSION_TOKEN_BYTES: usize = 32;
const MAX_ID_ATTEMPTS: usize = 3;

/// How the admin proved their identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Local,
    OAuth(String),
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::OAuth(provider) => write!(f, "oauth:{provider}"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Self::Local),
            other => match other.strip_prefix("oauth:") {
                Some(provider) if !provider.is_empty() => Ok(Self::OAuth(provider.to_string())),
                _ => Err(format!("unknown auth method: {other}")),
            },
        }
    }
}

#[derive(Clone)]
pub struct AdminSession {
    pub session_id: String,
    pub user_id: Uuid,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub session_token: String,
    pub valid: bool,
    pub auth_method: AuthMethod,
    pub is_admin: bool,
    pub csrf: Option<CsrfState>,
}

impl AdminSession {
    /// The credential pair handed to the client.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id.clone(),
            token: self.session_token.clone(),
        }
    }
}

impl fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSession")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("ip_address", &self.ip_address)
            .field("user_agent", &self.user_agent)
            .field("created_at", &self.created_at)
            .field("last_activity", &self.last_activity)
            .field("session_token", &"***")
            .field("valid", &self.valid)
            .field("auth_method", &self.auth_method)
            .field("is_admin", &self.is_admin)
            .field("csrf", &self.csrf)
            .finish()
    }
}

/// Identifier plus bearer secret as presented by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: String,
    pub token: String,
}

impl SessionHandle {
    /// Parse the `<id>.<token>` cookie form. Either half may be empty; `check`
    /// rejects those.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (session_id, token) = value.trim().split_once('.')?;
        Some(Self {
            session_id: session_id.to_string(),
            token: token.to_string(),
        })
    }

    #[must_use]
    pub fn to_cookie_value(&self) -> String {
        format!("{}.{}", self.session_id, self.token)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("token", &"***")
            .finish()
    }
}

/// Why a session failed validation. Only surfaced in logs and audit details.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionRejection {
    #[error("missing session token")]
    MissingToken,
    #[error("unknown session")]
    Unknown,
    #[error("session invalidated")]
    Invalidated,
    #[error("session token mismatch")]
    TokenMismatch,
    #[error("session idle timeout exceeded")]
    Expired,
    #[error("client IP changed")]
    IpMismatch,
    #[error("client User-Agent changed")]
    UserAgentMismatch,
    #[error("session lacks admin marker")]
    NotAdmin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub sessions: usize,
    pub lockouts: usize,
}

#[derive(Debug)]
pub struct SessionManager {
    config: Arc<SecurityConfig>,
    sessions: RwLock<HashMap<String, AdminSession>>,
    lockouts: LockoutTracker,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: Arc<SecurityConfig>) -> Self {
        let lockouts = LockoutTracker::new(config.max_failed_attempts(), config.lockout_duration());
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            lockouts,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    #[must_use]
    pub fn lockouts(&self) -> &LockoutTracker {
        &self.lockouts
    }

    /// Register a new admin session bound to the caller's IP and User-Agent.
    ///
    /// # Errors
    /// Returns an error if random generation fails or no unique identifier
    /// could be found.
    pub fn create_session(
        &self,
        user_id: Uuid,
        username: &str,
        auth_method: AuthMethod,
        ip: &str,
        user_agent: &str,
    ) -> Result<AdminSession> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let session_id = random_token(SESSION_ID_BYTES)?;
            let session_token = random_token(SESSION_TOKEN_BYTES)?;
            let now = Utc::now();
            let session = AdminSession {
                session_id: session_id.clone(),
                user_id,
                username: username.to_string(),
                ip_address: ip.to_string(),
                user_agent: user_agent.to_string(),
                created_at: now,
                last_activity: now,
                session_token,
                valid: true,
                auth_method: auth_method.clone(),
                is_admin: true,
                csrf: None,
            };

            let inserted = match self.sessions.write().entry(session_id) {
                Entry::Vacant(slot) => {
                    slot.insert(session.clone());
                    true
                }
                Entry::Occupied(_) => false,
            };

            if inserted {
                info!(
                    user_id = %user_id,
                    username,
                    auth_method = %session.auth_method,
                    ip,
                    "admin session created"
                );
                return Ok(session);
            }
        }
        Err(anyhow!("failed to allocate a unique session identifier"))
    }

    /// Boolean form of [`Self::check`].
    #[must_use]
    pub fn validate(
        &self,
        handle: &SessionHandle,
        ip: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self.check(handle, ip, user_agent, now) {
            Ok(_) => true,
            Err(reason) => {
                debug!(session_id = %handle.session_id, %reason, "session rejected");
                false
            }
        }
    }

    /// Validate a presented handle and return a snapshot of the session.
    ///
    /// # Errors
    /// Returns the first failing condition.
    pub fn check(
        &self,
        handle: &SessionHandle,
        ip: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<AdminSession, SessionRejection> {
        if handle.token.is_empty() || handle.session_id.is_empty() {
            return Err(SessionRejection::MissingToken);
        }

        let session = self
            .sessions
            .read()
            .get(&handle.session_id)
            .cloned()
            .ok_or(SessionRejection::Unknown)?;

        if !session.valid {
            return Err(SessionRejection::Invalidated);
        }
        if !constant_time_str_eq(&session.session_token, &handle.token) {
            return Err(SessionRejection::TokenMismatch);
        }
        if now.signed_duration_since(session.last_activity) > delta(self.config.session_timeout()) {
            return Err(SessionRejection::Expired);
        }
        if self.config.enforce_session_binding() {
            if session.ip_address != ip {
                return Err(SessionRejection::IpMismatch);
            }
            if session.user_agent != user_agent {
                return Err(SessionRejection::UserAgentMismatch);
            }
        }
        if !session.is_admin {
            return Err(SessionRejection::NotAdmin);
        }
        Ok(session)
    }

    /// Record activity on a live session. Returns `false` if the session is gone.
    pub fn touch(&self, session_id: &str, ip: &str, user_agent: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        if !session.valid {
            return false;
        }
        if now > session.last_activity {
            session.last_activity = now;
        }
        if self.config.rebind_on_touch() {
            if session.ip_address != ip {
                session.ip_address = ip.to_string();
            }
            if session.user_agent != user_agent {
                session.user_agent = user_agent.to_string();
            }
        }
        true
    }

    /// Mark the session invalid and drop it. Safe to call repeatedly.
    pub fn invalidate(&self, session_id: &str) -> Option<AdminSession> {
        let mut removed = self.sessions.write().remove(session_id)?;
        removed.valid = false;
        info!(session_id, user_id = %removed.user_id, "admin session invalidated");
        Some(removed)
    }

    /// Remove idle or invalid sessions and stale lockout records.
    pub fn reap_expired(&self, now: DateTime<Utc>) -> ReapStats {
        let timeout = delta(self.config.session_timeout());
        let sessions = {
            let mut sessions = self.sessions.write();
            let before = sessions.len();
            sessions.retain(|_, session| {
                session.valid && now.signed_duration_since(session.last_activity) <= timeout
            });
            before - sessions.len()
        };
        let lockouts = self.lockouts.purge_expired(now);
        ReapStats { sessions, lockouts }
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<AdminSession> {
        self.sessions.read().get(session_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// `None` if the session does not exist; `Some(None)` if no token was issued yet.
    pub(crate) fn csrf_state(&self, session_id: &str) -> Option<Option<CsrfState>> {
        self.sessions
            .read()
            .get(session_id)
            .map(|session| session.csrf.clone())
    }

    /// Store a CSRF token on a live session. Last writer wins.
    pub(crate) fn set_csrf_state(&self, session_id: &str, state: CsrfState) -> bool {
        match self.sessions.write().get_mut(session_id) {
            Some(session) if session.valid => {
                session.csrf = Some(state);
                true
            }
            _ => false,
        }
    }
}
