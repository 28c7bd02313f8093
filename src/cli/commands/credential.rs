use clap::{value_parser, Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SERVICE_SECRET: &str = "service-secret";
pub const ARG_KNOWN_SUBJECTS: &str = "known-subjects";
pub const ARG_SUBJECT: &str = "subject";
pub const ARG_TTL_SECONDS: &str = "ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub secret: SecretString,
    pub known_subjects: Vec<String>,
}

impl Options {
    /// Parse service credential arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the shared secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = match matches.get_one::<String>(ARG_SERVICE_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_SERVICE_SECRET}"),
        };
        let known_subjects = matches
            .get_many::<String>(ARG_KNOWN_SUBJECTS)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            secret,
            known_subjects,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SERVICE_SECRET)
                .long(ARG_SERVICE_SECRET)
                .help("Shared HMAC secret for service callback credentials")
                .env("GATEKEEPER_SERVICE_SECRET")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_KNOWN_SUBJECTS)
                .long(ARG_KNOWN_SUBJECTS)
                .help("Comma-separated subjects expected to present service credentials")
                .env("GATEKEEPER_KNOWN_SUBJECTS")
                .value_delimiter(','),
        )
}

/// `token` subcommand: mint a service credential.
#[must_use]
pub fn token_command() -> Command {
    Command::new("token")
        .about("Print a signed service credential")
        .arg(
            Arg::new(ARG_SUBJECT)
                .long(ARG_SUBJECT)
                .help("Subject (sub) claim, e.g. the calling service name")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TTL_SECONDS)
                .long(ARG_TTL_SECONDS)
                .help("Credential lifetime in seconds")
                .default_value("300")
                .value_parser(value_parser!(u64)),
        )
}
