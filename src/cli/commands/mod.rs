pub mod credential;
pub mod directory;
pub mod logging;
pub mod security;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    value_parser, Arg, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("gatekeeper")
        .about("Admin session, CSRF and service credential gate")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand(credential::token_command())
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("GATEKEEPER_PORT")
                .value_parser(value_parser!(u16)),
        );

    let command = security::with_args(command);
    let command = credential::with_args(command);
    let command = directory::with_args(command);
    logging::with_args(command)
}
