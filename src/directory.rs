//! In-memory collaborators used by the `gatekeeper` binary and tests.
//!
//! Production deployments back these traits with their own user store and
//! authorization service; these keep everything in process.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use std::collections::{HashMap, VecDeque};
use tracing::info;
use uuid::Uuid;

use crate::security::{
    AuditContext, AuditOutcome, AuthorizationReason, AuthorizationResult,
    EmailAuthorizationService, User, UserDirectory, ADMIN_ROLE,
};

const MAX_AUDIT_RECORDS: usize = 1024;
const SALT_LENGTH: usize = 16;

struct StoredUser {
    user: User,
    /// Argon2id PHC string.
    password_hash: String,
}

pub struct InMemoryUserDirectory {
    argon2: Argon2<'static>,
    users: RwLock<HashMap<Uuid, StoredUser>>,
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::with_params(Params::default())
    }
}

impl InMemoryUserDirectory {
    /// Directory hashing with the default Argon2id parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory hashing with caller-chosen Argon2id parameters (cheap ones
    /// for tests).
    #[must_use]
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::default(), params),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Register a user and return its generated id.
    ///
    /// # Errors
    /// Returns an error if the password cannot be hashed.
    pub fn insert(&self, username: &str, email: &str, role: &str, password: &str) -> Result<Uuid> {
        let password_hash = self.hash_password(password)?;
        let id = Uuid::new_v4();
        let user = User {
            id,
            username: username.to_string(),
            email: email.trim().to_lowercase(),
            role: role.to_string(),
        };
        self.users.write().insert(
            id,
            StoredUser {
                user,
                password_hash,
            },
        );
        Ok(id)
    }

    /// Parse a `username:email:role:password` seed entry.
    ///
    /// # Errors
    /// Returns an error if a field is missing or empty.
    pub fn insert_seed(&self, entry: &str) -> Result<Uuid> {
        let mut fields = entry.splitn(4, ':');
        let mut next = |name: &str| {
            fields
                .next()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| anyhow!("user seed is missing {name}: expected username:email:role:password"))
        };
        let username = next("username")?;
        let email = next("email")?;
        let role = next("role")?;
        let password = next("password")?;
        self.insert(username, email, role, password)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|err| anyhow!("failed to generate salt: {err}"))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|err| anyhow!("invalid salt: {err}"))?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    fn lookup(&self, login: &str) -> Option<(User, String)> {
        let login = login.trim();
        self.users
            .read()
            .values()
            .find(|stored| stored.user.username == login || stored.user.email.eq_ignore_ascii_case(login))
            .map(|stored| (stored.user.clone(), stored.password_hash.clone()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).map(|stored| stored.user.clone()))
    }

    async fn find_user(&self, login: &str) -> Result<Option<User>> {
        Ok(self.lookup(login).map(|(user, _)| user))
    }

    async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>> {
        let Some((user, stored)) = self.lookup(login) else {
            return Ok(None);
        };
        let parsed = PasswordHash::new(&stored).map_err(|err| anyhow!("corrupt password hash: {err}"))?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
            .then_some(user))
    }
}

#[derive(Clone, Debug)]
pub struct AuthorizedEmail {
    pub role: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct AuditRecord {
    pub at: DateTime<Utc>,
    pub ctx: AuditContext,
    pub email: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub user_id: Option<Uuid>,
    pub details: String,
}

/// Allow-list of emails permitted to use the admin surface.
#[derive(Default)]
pub struct InMemoryEmailAuthorization {
    emails: RwLock<HashMap<String, AuthorizedEmail>>,
    audit: RwLock<VecDeque<AuditRecord>>,
}

impl InMemoryEmailAuthorization {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize(&self, email: &str, role: &str, expires_at: Option<DateTime<Utc>>) {
        self.emails.write().insert(
            email.trim().to_lowercase(),
            AuthorizedEmail {
                role: role.to_string(),
                expires_at,
                revoked: false,
                last_used: None,
            },
        );
    }

    /// Returns `false` if the email was never authorized.
    pub fn revoke(&self, email: &str) -> bool {
        match self.emails.write().get_mut(&email.trim().to_lowercase()) {
            Some(entry) => {
                entry.revoked = true;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, email: &str) -> Option<AuthorizedEmail> {
        self.emails.read().get(&email.trim().to_lowercase()).cloned()
    }

    /// Most recent audit records, oldest first.
    #[must_use]
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().iter().cloned().collect()
    }
}

#[async_trait]
impl EmailAuthorizationService for InMemoryEmailAuthorization {
    async fn check_email_authorization(&self, email: &str) -> Result<AuthorizationResult> {
        let now = Utc::now();
        let mut emails = self.emails.write();
        let Some(entry) = emails.get_mut(&email.trim().to_lowercase()) else {
            return Ok(AuthorizationResult::denied(AuthorizationReason::NotListed));
        };
        if entry.revoked {
            return Ok(AuthorizationResult::denied(AuthorizationReason::Revoked));
        }
        if entry.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Ok(AuthorizationResult::denied(AuthorizationReason::Expired));
        }
        if entry.role != ADMIN_ROLE {
            return Ok(AuthorizationResult::denied(AuthorizationReason::RoleMismatch));
        }
        entry.last_used = Some(now);
        Ok(AuthorizationResult::granted(&entry.role))
    }

    async fn log_authorization_attempt(
        &self,
        ctx: &AuditContext,
        email: &str,
        action: &str,
        result: AuditOutcome,
        user_id: Option<Uuid>,
        details: &str,
    ) -> Result<()> {
        info!(
            target: "audit",
            email,
            action,
            result = %result,
            user_id = ?user_id,
            ip = %ctx.ip_address,
            path = %ctx.path,
            request_id = ctx.request_id.as_deref().unwrap_or("none"),
            details,
            "authorization attempt"
        );
        let mut audit = self.audit.write();
        if audit.len() == MAX_AUDIT_RECORDS {
            audit.pop_front();
        }
        audit.push_back(AuditRecord {
            at: Utc::now(),
            ctx: ctx.clone(),
            email: email.to_string(),
            action: action.to_string(),
            outcome: result,
            user_id,
            details: details.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn directory() -> InMemoryUserDirectory {
        InMemoryUserDirectory::with_params(Params::new(8, 1, 1, None).unwrap_or_default())
    }

    #[tokio::test]
    async fn authenticate_by_username_or_email() -> Result<()> {
        let directory = directory();
        let id = directory.insert("alice", "Alice@Example.com", ADMIN_ROLE, "hunter2")?;

        let user = directory.authenticate("alice", "hunter2").await?;
        assert_eq!(user.map(|u| u.id), Some(id));
        let user = directory.authenticate("alice@example.com", "hunter2").await?;
        assert_eq!(user.map(|u| u.email), Some("alice@example.com".to_string()));
        assert!(directory.authenticate("alice", "wrong").await?.is_none());
        assert!(directory.authenticate("mallory", "hunter2").await?.is_none());
        assert!(directory.get_user(id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn passwords_are_stored_as_salted_argon2id() -> Result<()> {
        let directory = directory();
        let first = directory.insert("alice", "alice@example.com", ADMIN_ROLE, "hunter2")?;
        let second = directory.insert("bob", "bob@example.com", ADMIN_ROLE, "hunter2")?;

        let hashes: Vec<String> = {
            let users = directory.users.read();
            [first, second]
                .iter()
                .filter_map(|id| users.get(id).map(|stored| stored.password_hash.clone()))
                .collect()
        };
        assert_eq!(hashes.len(), 2);
        assert!(hashes.iter().all(|hash| hash.starts_with("$argon2id$")));
        assert_ne!(hashes[0], hashes[1]);
        assert!(directory.authenticate("bob", "hunter2").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn find_user_resolves_aliases() -> Result<()> {
        let directory = directory();
        let id = directory.insert("alice", "alice@example.com", ADMIN_ROLE, "hunter2")?;
        assert_eq!(directory.find_user("alice").await?.map(|u| u.id), Some(id));
        assert_eq!(directory.find_user(" ALICE@example.com ").await?.map(|u| u.id), Some(id));
        assert!(directory.find_user("mallory").await?.is_none());
        Ok(())
    }

    #[test]
    fn seed_entries_require_all_fields() -> Result<()> {
        let directory = directory();
        directory.insert_seed("bob:bob@example.com:admin:pa:ss")?;
        assert_eq!(directory.len(), 1);
        assert!(directory.insert_seed("carol:carol@example.com:admin").is_err());
        assert!(directory.insert_seed("dave::admin:pw").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn email_authorization_states() -> Result<()> {
        let service = InMemoryEmailAuthorization::new();
        let result = service.check_email_authorization("alice@example.com").await?;
        assert_eq!(result.reason, AuthorizationReason::NotListed);

        service.authorize("Alice@example.com", ADMIN_ROLE, None);
        let result = service.check_email_authorization("alice@example.com").await?;
        assert!(result.authorized);
        assert!(service.get("alice@example.com").is_some_and(|e| e.last_used.is_some()));

        service.authorize("eve@example.com", "viewer", None);
        let result = service.check_email_authorization("eve@example.com").await?;
        assert_eq!(result.reason, AuthorizationReason::RoleMismatch);

        service.authorize("old@example.com", ADMIN_ROLE, Some(Utc::now() - TimeDelta::minutes(1)));
        let result = service.check_email_authorization("old@example.com").await?;
        assert_eq!(result.reason, AuthorizationReason::Expired);

        assert!(service.revoke("alice@example.com"));
        let result = service.check_email_authorization("alice@example.com").await?;
        assert_eq!(result.reason, AuthorizationReason::Revoked);
        assert!(!service.revoke("nobody@example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn audit_records_are_kept() -> Result<()> {
        let service = InMemoryEmailAuthorization::new();
        service
            .log_authorization_attempt(
                &AuditContext::default(),
                "alice@example.com",
                "admin_access",
                AuditOutcome::Granted,
                None,
                "admitted",
            )
            .await?;
        let records = service.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Granted);
        Ok(())
    }
}
