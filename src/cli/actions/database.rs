use anyhow::Result;
use secrecy::SecretString;
use tracing::info;

use crate::db::{self, PoolConfig};

#[derive(Debug)]
pub struct Args {
    pub dsn: SecretString,
    pub pool: PoolConfig,
}

/// Apply the embedded schema.
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn migrate(args: Args) -> Result<()> {
    let pool = db::connect(&args.dsn, &args.pool).await?;
    db::migrate(&pool).await?;
    pool.close().await;
    info!("Schema is up to date");
    Ok(())
}

/// Insert the demo accounts; existing rows are left alone.
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn seed(args: Args) -> Result<()> {
    let pool = db::connect(&args.dsn, &args.pool).await?;
    db::seed(&pool).await?;
    pool.close().await;
    info!("Demo accounts seeded");
    Ok(())
}
