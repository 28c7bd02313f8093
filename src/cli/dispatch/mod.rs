//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an [`Action`]: the `token` subcommand mints
//! a service credential, anything else starts the server.

use crate::cli::actions::{server, token, Action};
use crate::cli::commands::{credential, directory, security, ARG_PORT};
use anyhow::{Context, Result};
use std::time::Duration;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(("token", sub)) = matches.subcommand() {
        let credential_opts = credential::Options::parse(sub)?;
        let subject = sub
            .get_one::<String>(credential::ARG_SUBJECT)
            .cloned()
            .context("missing required argument: --subject")?;
        let ttl = sub
            .get_one::<u64>(credential::ARG_TTL_SECONDS)
            .copied()
            .unwrap_or(300);
        return Ok(Action::Token(token::Args {
            secret: credential_opts.secret,
            subject,
            ttl: Duration::from_secs(ttl),
        }));
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let security_config = security::parse(matches)?;
    let credential_opts = credential::Options::parse(matches)?;
    let directory_opts = directory::Options::parse(matches);

    Ok(Action::Server(server::Args {
        port,
        security: security_config,
        service_secret: credential_opts.secret,
        known_subjects: credential_opts.known_subjects,
        users: directory_opts.users,
        authorized_emails: directory_opts.authorized_emails,
    }))
}
