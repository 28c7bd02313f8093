use crate::security::ServiceCredentialVerifier;
use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub struct Args {
    pub secret: SecretString,
    pub subject: String,
    pub ttl: Duration,
}

/// Mint a credential for `args.subject`.
///
/// # Errors
/// Returns an error if the credential cannot be encoded.
pub fn issue(args: &Args) -> Result<String> {
    ServiceCredentialVerifier::new(args.secret.clone())
        .issue(&args.subject, args.ttl, Utc::now().timestamp())
        .context("failed to issue service credential")
}

/// Print a fresh credential to stdout.
///
/// # Errors
/// Returns an error if the credential cannot be encoded.
pub fn execute(args: &Args) -> Result<()> {
    let token = issue(args)?;
    println!("{token}");
    Ok(())
}
