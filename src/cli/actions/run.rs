use crate::cli::actions::{Action, database, server};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Migrate(args) => database::migrate(args).await,
        Action::Seed(args) => database::seed(args).await,
    }
}
