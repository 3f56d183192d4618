//! Map parsed arguments to the action the binary runs.

use anyhow::{Result, anyhow};

use crate::{
    api::AppConfig,
    cli::{
        actions::{Action, database, server},
        commands::{self, ARG_PORT, CMD_MIGRATE, CMD_SEED, CMD_SERVE, auth, session},
    },
};

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let db = commands::database::Options::parse(matches)?;

    match matches.subcommand_name() {
        Some(CMD_MIGRATE) => Ok(Action::Migrate(database::Args {
            dsn: db.dsn,
            pool: db.pool,
        })),
        Some(CMD_SEED) => Ok(Action::Seed(database::Args {
            dsn: db.dsn,
            pool: db.pool,
        })),
        Some(CMD_SERVE) | None => {
            let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
            let auth_opts = auth::Options::parse(matches);
            let session_opts = session::Options::parse(matches);

            let config = AppConfig::default()
                .with_port(port)
                .with_pool(db.pool)
                .with_store_timeout(auth_opts.store_timeout)
                .with_hash_params(auth_opts.hash_params)
                .with_hash_concurrency(auth_opts.hash_concurrency)
                .with_claims_ttl_seconds(auth_opts.claims_ttl_seconds)
                .with_session(session_opts.config)
                .with_session_cleanup_interval(session_opts.cleanup_interval);

            Ok(Action::Server(server::Args { dsn: db.dsn, config }))
        }
        Some(other) => Err(anyhow!("unknown subcommand: {other}")),
    }
}
