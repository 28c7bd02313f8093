//! Upstream principal attachment.
//!
//! Runs before the access gate: resolves the `admin_session` cookie to a live
//! session whose token matches, loads the user through the directory, and
//! stores a [`Principal`] in request extensions. Anything that does not
//! resolve simply leaves the request anonymous; the gate decides what that
//! means.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::USER_AGENT, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    authorization::{User, UserDirectory},
    cookies::{cookie_value, SESSION_COOKIE},
    ip::IpAllowList,
    secure::constant_time_str_eq,
    session::{AuthMethod, SessionHandle, SessionManager},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user: User,
    pub session: SessionHandle,
    pub auth_method: AuthMethod,
}

/// Caller address and agent as used for session binding and the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    /// The socket peer, unless it is a trusted proxy; then `X-Forwarded-For`,
    /// then `X-Real-IP`, then the peer.
    #[must_use]
    pub fn from_parts(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trusted_proxies: &IpAllowList,
    ) -> Self {
        let peer_ip = peer.map(|addr| addr.ip().to_canonical());
        let forwarded = peer_ip
            .filter(|addr| trusted_proxies.contains(*addr))
            .and_then(|_| extract_client_ip(headers));
        let ip = forwarded
            .or_else(|| peer_ip.map(|addr| addr.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Self { ip, user_agent }
    }

    #[must_use]
    pub fn from_request(request: &Request, trusted_proxies: &IpAllowList) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::from_parts(request.headers(), peer, trusted_proxies)
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
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

#[derive(Clone)]
pub struct PrincipalResolver {
    sessions: Arc<SessionManager>,
    users: Arc<dyn UserDirectory>,
}

impl PrincipalResolver {
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, users: Arc<dyn UserDirectory>) -> Self {
        Self { sessions, users }
    }

    /// Resolve the session cookie in `headers` to a principal.
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<Principal> {
        let handle = cookie_value(headers, SESSION_COOKIE)
            .as_deref()
            .and_then(SessionHandle::parse)?;
        let session = self.sessions.get(&handle.session_id)?;
        if handle.token.is_empty() || !constant_time_str_eq(&session.session_token, &handle.token) {
            debug!(session_id = %handle.session_id, "session cookie does not match a live session");
            return None;
        }
        match self.users.get_user(session.user_id).await {
            Ok(Some(user)) => Some(Principal {
                user,
                session: handle,
                auth_method: session.auth_method,
            }),
            Ok(None) => {
                debug!(user_id = %session.user_id, "session user no longer exists");
                None
            }
            Err(err) => {
                error!(user_id = %session.user_id, "failed to load session user: {err:#}");
                None
            }
        }
    }
}

/// Attach a [`Principal`] and [`ClientInfo`] to the request.
pub async fn attach_principal(
    State(resolver): State<Arc<PrincipalResolver>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client = ClientInfo::from_request(&request, resolver.sessions.config().trusted_proxies());
    if let Some(principal) = resolver.resolve(request.headers()).await {
        request.extensions_mut().insert(principal);
    }
    request.extensions_mut().insert(client);
    next.run(request).await
}
