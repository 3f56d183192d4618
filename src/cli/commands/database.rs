use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::db::PoolConfig;

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_ACQUIRE_TIMEOUT: &str = "db-acquire-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("SNPTX_DSN")
                .global(true)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum number of pooled database connections")
                .env("SNPTX_DB_MAX_CONNECTIONS")
                .global(true)
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_ACQUIRE_TIMEOUT)
                .long(ARG_DB_ACQUIRE_TIMEOUT)
                .help("Seconds to wait for a free pooled connection")
                .env("SNPTX_DB_ACQUIRE_TIMEOUT_SECONDS")
                .global(true)
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub dsn: SecretString,
    pub pool: PoolConfig,
}

impl Options {
    /// # Errors
    /// Returns an error if the DSN is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .context("missing required argument: --dsn")?;
        let max_connections = matches
            .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
            .copied()
            .unwrap_or(10);
        let acquire_timeout = matches
            .get_one::<u64>(ARG_DB_ACQUIRE_TIMEOUT)
            .copied()
            .unwrap_or(5);

        Ok(Self {
            dsn: SecretString::from(dsn),
            pool: PoolConfig::default()
                .with_max_connections(max_connections)
                .with_acquire_timeout(Duration::from_secs(acquire_timeout)),
        })
    }
}
