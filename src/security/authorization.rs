//! Collaborator interfaces: the user store and the email authorization service.
//!
//! Both are black boxes to the gate. Authorization results are re-fetched on
//! every privileged request and never cached here.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationReason {
    Authorized,
    NotListed,
    Revoked,
    Expired,
    RoleMismatch,
}

impl fmt::Display for AuthorizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Authorized => "authorized",
            Self::NotListed => "email not authorized for admin access",
            Self::Revoked => "admin authorization revoked",
            Self::Expired => "admin authorization expired",
            Self::RoleMismatch => "authorized role does not grant admin access",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub authorized: bool,
    pub reason: AuthorizationReason,
    pub role: Option<String>,
    pub auth_method: Option<String>,
}

impl AuthorizationResult {
    #[must_use]
    pub fn granted(role: &str) -> Self {
        Self {
            authorized: true,
            reason: AuthorizationReason::Authorized,
            role: Some(role.to_string()),
            auth_method: None,
        }
    }

    #[must_use]
    pub fn denied(reason: AuthorizationReason) -> Self {
        Self {
            authorized: false,
            reason,
            role: None,
            auth_method: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Granted,
    Denied,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => f.write_str("granted"),
            Self::Denied => f.write_str("denied"),
        }
    }
}

/// Request facts recorded alongside every audit entry.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AuditContext {
    pub request_id: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub method: String,
    pub path: String,
}

#[async_trait]
pub trait EmailAuthorizationService: Send + Sync {
    /// Current authorization for `email`.
    async fn check_email_authorization(&self, email: &str) -> Result<AuthorizationResult>;

    /// Record an access decision.
    async fn log_authorization_attempt(
        &self,
        ctx: &AuditContext,
        email: &str,
        action: &str,
        result: AuditOutcome,
        user_id: Option<Uuid>,
        details: &str,
    ) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Look up an account by username or email without checking credentials.
    async fn find_user(&self, login: &str) -> Result<Option<User>>;

    /// Check local credentials. `login` is a username or email.
    async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>>;
}

/// A single audit entry, handed to [`spawn_audit`].
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub ctx: AuditContext,
    pub email: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub user_id: Option<Uuid>,
    pub details: String,
}

/// Write an audit entry in the background. Failures are logged and dropped.
pub fn spawn_audit(service: Arc<dyn EmailAuthorizationService>, entry: AuditEntry) {
    tokio::spawn(async move {
        if let Err(err) = service
            .log_authorization_attempt(
                &entry.ctx,
                &entry.email,
                &entry.action,
                entry.outcome,
                entry.user_id,
                &entry.details,
            )
            .await
        {
            error!(action = %entry.action, path = %entry.ctx.path, "failed to write audit entry: {err:#}");
        }
    });
}
