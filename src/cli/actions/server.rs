use crate::{
    api,
    directory::{InMemoryEmailAuthorization, InMemoryUserDirectory},
    security::{SecurityConfig, ServiceCredentialVerifier, SessionManager, ADMIN_ROLE},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub security: SecurityConfig,
    pub service_secret: SecretString,
    pub known_subjects: Vec<String>,
    pub users: Vec<String>,
    pub authorized_emails: Vec<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a user seed is malformed or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let users = InMemoryUserDirectory::new();
    for seed in &args.users {
        users
            .insert_seed(seed)
            .context("invalid GATEKEEPER_USERS entry")?;
    }
    if users.is_empty() {
        warn!("no users seeded; admin login is impossible");
    }

    let authorization = InMemoryEmailAuthorization::new();
    for email in &args.authorized_emails {
        authorization.authorize(email, ADMIN_ROLE, None);
    }

    debug!("Security config: {:?}", args.security);

    let sessions = Arc::new(SessionManager::new(Arc::new(args.security)));
    let credentials =
        ServiceCredentialVerifier::new(args.service_secret).with_known_subjects(args.known_subjects);

    let state = api::AppState::new(
        sessions,
        Arc::new(users),
        Arc::new(authorization),
        credentials,
    );

    api::new(args.port, state).await
}
