use anyhow::Result;
use secrecy::SecretString;
use tracing::debug;

use crate::{api, cli::telemetry};

#[derive(Debug)]
pub struct Args {
    pub dsn: SecretString,
    pub config: api::AppConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server config: {:?}", args.config);

    let result = api::new(args.dsn, args.config).await;

    telemetry::shutdown_tracer();

    result
}
