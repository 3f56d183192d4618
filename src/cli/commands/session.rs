use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

use crate::session::SessionConfig;

pub const ARG_SESSION_LIFETIME: &str = "session-lifetime-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_SESSION_CLEANUP: &str = "session-cleanup-interval-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_LIFETIME)
                .long(ARG_SESSION_LIFETIME)
                .help("Session lifetime after the last write, in seconds")
                .env("SNPTX_SESSION_LIFETIME_SECONDS")
                .global(true)
                .default_value("43200")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark session and CSRF cookies Secure; disable only for plain-HTTP development")
                .env("SNPTX_COOKIE_SECURE")
                .global(true)
                .action(ArgAction::Set)
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_SESSION_CLEANUP)
                .long(ARG_SESSION_CLEANUP)
                .help("Interval between expired-session sweeps in seconds, 0 disables")
                .env("SNPTX_SESSION_CLEANUP_INTERVAL_SECONDS")
                .global(true)
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub config: SessionConfig,
    pub cleanup_interval: Duration,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let lifetime = matches
            .get_one::<i64>(ARG_SESSION_LIFETIME)
            .copied()
            .unwrap_or(43200);
        let secure = matches
            .get_one::<bool>(ARG_COOKIE_SECURE)
            .copied()
            .unwrap_or(true);
        let cleanup = matches
            .get_one::<u64>(ARG_SESSION_CLEANUP)
            .copied()
            .unwrap_or(300);

        Self {
            config: SessionConfig::default()
                .with_lifetime_seconds(lifetime)
                .with_cookie_secure(secure),
            cleanup_interval: Duration::from_secs(cleanup),
        }
    }
}
