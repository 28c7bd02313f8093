use clap::{Arg, ArgMatches, Command};

pub const ARG_USERS: &str = "users";
pub const ARG_AUTHORIZED_EMAILS: &str = "authorized-emails";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub users: Vec<String>,
    pub authorized_emails: Vec<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let list = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| {
                    values
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            users: list(ARG_USERS),
            authorized_emails: list(ARG_AUTHORIZED_EMAILS),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_USERS)
                .long(ARG_USERS)
                .help("Comma-separated user seeds: username:email:role:password")
                .env("GATEKEEPER_USERS")
                .hide_env_values(true)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_AUTHORIZED_EMAILS)
                .long(ARG_AUTHORIZED_EMAILS)
                .help("Comma-separated emails authorized for admin access")
                .env("GATEKEEPER_AUTHORIZED_EMAILS")
                .value_delimiter(','),
        )
}
