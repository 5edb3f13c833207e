use crate::cli::actions::{destroy, list, refresh, server, show, up, Action};
use anyhow::Result;

/// Execute the provided action.
// This is the single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
        Action::Up(args) => up::execute(args).await,
        Action::Refresh(args) => refresh::execute(args).await,
        Action::Destroy(args) => destroy::execute(args).await,
        Action::List(args) => list::execute(args).await,
        Action::Show(args) => show::execute(args).await,
    }
}
