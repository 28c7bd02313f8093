use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

use crate::security::{IpAllowList, SecurityConfig};

pub const ARG_SESSION_TIMEOUT: &str = "session-timeout-seconds";
pub const ARG_MAX_FAILED_ATTEMPTS: &str = "max-failed-attempts";
pub const ARG_LOCKOUT_DURATION: &str = "lockout-duration-seconds";
pub const ARG_REQUIRE_EMAIL_AUTHORIZATION: &str = "require-email-authorization";
pub const ARG_IP_WHITELIST: &str = "ip-whitelist";
pub const ARG_TRUSTED_PROXIES: &str = "trusted-proxies";
pub const ARG_ENFORCE_SESSION_BINDING: &str = "enforce-session-binding";
pub const ARG_REBIND_ON_TOUCH: &str = "rebind-on-touch";
pub const ARG_CSRF_TOKEN_LENGTH: &str = "csrf-token-length";
pub const ARG_CSRF_TOKEN_EXPIRY: &str = "csrf-token-expiry-seconds";
pub const ARG_REQUIRE_HTTPS: &str = "require-https";
pub const ARG_DOUBLE_SUBMIT: &str = "double-submit";
pub const ARG_HEADER_VALIDATION: &str = "header-validation";
pub const ARG_EXEMPT_PATHS: &str = "exempt-paths";
pub const ARG_FAILURE_REDIRECT: &str = "failure-redirect";
pub const ARG_REAP_INTERVAL: &str = "reap-interval-seconds";

/// Build and validate a [`SecurityConfig`] from matches.
///
/// # Errors
/// Returns an error if an allow-list entry is malformed or the resulting
/// configuration disables a protection.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<SecurityConfig> {
    let seconds = |id: &str| {
        matches
            .get_one::<u64>(id)
            .copied()
            .map(Duration::from_secs)
    };
    let flag = |id: &str| matches.get_one::<bool>(id).copied();

    let mut config = SecurityConfig::new();
    if let Some(timeout) = seconds(ARG_SESSION_TIMEOUT) {
        config = config.with_session_timeout(timeout);
    }
    if let Some(attempts) = matches.get_one::<u32>(ARG_MAX_FAILED_ATTEMPTS).copied() {
        config = config.with_max_failed_attempts(attempts);
    }
    if let Some(duration) = seconds(ARG_LOCKOUT_DURATION) {
        config = config.with_lockout_duration(duration);
    }
    if let Some(required) = flag(ARG_REQUIRE_EMAIL_AUTHORIZATION) {
        config = config.with_require_email_authorization(required);
    }
    if let Some(entries) = matches.get_many::<String>(ARG_IP_WHITELIST) {
        config = config.with_ip_whitelist(IpAllowList::parse(entries)?);
    }
    if let Some(entries) = matches.get_many::<String>(ARG_TRUSTED_PROXIES) {
        config = config.with_trusted_proxies(IpAllowList::parse(entries)?);
    }
    if let Some(enforce) = flag(ARG_ENFORCE_SESSION_BINDING) {
        config = config.with_enforce_session_binding(enforce);
    }
    if let Some(rebind) = flag(ARG_REBIND_ON_TOUCH) {
        config = config.with_rebind_on_touch(rebind);
    }
    if let Some(length) = matches.get_one::<usize>(ARG_CSRF_TOKEN_LENGTH).copied() {
        config = config.with_csrf_token_length(length);
    }
    if let Some(expiry) = seconds(ARG_CSRF_TOKEN_EXPIRY) {
        config = config.with_token_expiry(expiry);
    }
    if let Some(required) = flag(ARG_REQUIRE_HTTPS) {
        config = config.with_require_https(required);
    }
    if let Some(enabled) = flag(ARG_DOUBLE_SUBMIT) {
        config = config.with_double_submit(enabled);
    }
    if let Some(enabled) = flag(ARG_HEADER_VALIDATION) {
        config = config.with_header_validation(enabled);
    }
    if let Some(paths) = matches.get_many::<String>(ARG_EXEMPT_PATHS) {
        let paths: Vec<String> = paths
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .collect();
        if !paths.is_empty() {
            config = config.with_exempt_paths(paths);
        }
    }
    if let Some(redirect) = matches.get_one::<String>(ARG_FAILURE_REDIRECT) {
        config = config.with_failure_redirect(redirect.clone());
    }
    if let Some(interval) = seconds(ARG_REAP_INTERVAL) {
        config = config.with_reap_interval(interval);
    }

    config.validate()?;
    Ok(config)
}

fn bool_arg(id: &'static str, help: &'static str, env: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .default_value(default)
        .action(ArgAction::Set)
        .value_parser(value_parser!(bool))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_csrf_args(command);
    with_gate_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TIMEOUT)
                .long(ARG_SESSION_TIMEOUT)
                .help("Idle timeout for admin sessions in seconds")
                .env("GATEKEEPER_SESSION_TIMEOUT_SECONDS")
                .default_value("1800")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAX_FAILED_ATTEMPTS)
                .long(ARG_MAX_FAILED_ATTEMPTS)
                .help("Failed logins before an identifier is locked out")
                .env("GATEKEEPER_MAX_FAILED_ATTEMPTS")
                .default_value("3")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_DURATION)
                .long(ARG_LOCKOUT_DURATION)
                .help("Lockout length in seconds")
                .env("GATEKEEPER_LOCKOUT_DURATION_SECONDS")
                .default_value("900")
                .value_parser(value_parser!(u64)),
        )
        .arg(bool_arg(
            ARG_ENFORCE_SESSION_BINDING,
            "Reject sessions whose IP or User-Agent changed",
            "GATEKEEPER_ENFORCE_SESSION_BINDING",
            "true",
        ))
        .arg(bool_arg(
            ARG_REBIND_ON_TOUCH,
            "Record the latest IP and User-Agent on every admitted request",
            "GATEKEEPER_REBIND_ON_TOUCH",
            "true",
        ))
        .arg(
            Arg::new(ARG_REAP_INTERVAL)
                .long(ARG_REAP_INTERVAL)
                .help("How often idle sessions and stale lockout records are purged, in seconds")
                .env("GATEKEEPER_REAP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(value_parser!(u64)),
        )
}

fn with_csrf_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CSRF_TOKEN_LENGTH)
                .long(ARG_CSRF_TOKEN_LENGTH)
                .help("CSRF token length in random bytes")
                .env("GATEKEEPER_CSRF_TOKEN_LENGTH")
                .default_value("32")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_CSRF_TOKEN_EXPIRY)
                .long(ARG_CSRF_TOKEN_EXPIRY)
                .help("CSRF token lifetime in seconds")
                .env("GATEKEEPER_CSRF_TOKEN_EXPIRY_SECONDS")
                .default_value("14400")
                .value_parser(value_parser!(u64)),
        )
        .arg(bool_arg(
            ARG_DOUBLE_SUBMIT,
            "Require the CSRF cookie to match the submitted token",
            "GATEKEEPER_DOUBLE_SUBMIT",
            "true",
        ))
        .arg(bool_arg(
            ARG_HEADER_VALIDATION,
            "Require Origin or Referer to match the request host",
            "GATEKEEPER_HEADER_VALIDATION",
            "true",
        ))
}

fn with_gate_args(command: Command) -> Command {
    command
        .arg(bool_arg(
            ARG_REQUIRE_EMAIL_AUTHORIZATION,
            "Consult the email authorization service on every admin request",
            "GATEKEEPER_REQUIRE_EMAIL_AUTHORIZATION",
            "true",
        ))
        .arg(bool_arg(
            ARG_REQUIRE_HTTPS,
            "Deny plain HTTP admin requests and mark cookies Secure",
            "GATEKEEPER_REQUIRE_HTTPS",
            "false",
        ))
        .arg(
            Arg::new(ARG_IP_WHITELIST)
                .long(ARG_IP_WHITELIST)
                .help("Comma-separated IPs or CIDR networks allowed on admin routes (empty: all)")
                .env("GATEKEEPER_IP_WHITELIST")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_TRUSTED_PROXIES)
                .long(ARG_TRUSTED_PROXIES)
                .help("Comma-separated proxy IPs or CIDR networks whose X-Forwarded-For is believed")
                .env("GATEKEEPER_TRUSTED_PROXIES")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_EXEMPT_PATHS)
                .long(ARG_EXEMPT_PATHS)
                .help("Comma-separated path prefixes that bypass the gate")
                .env("GATEKEEPER_EXEMPT_PATHS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_FAILURE_REDIRECT)
                .long(ARG_FAILURE_REDIRECT)
                .help("Where browsers are sent after a denied request")
                .env("GATEKEEPER_FAILURE_REDIRECT")
                .default_value("/login"),
        )
}
