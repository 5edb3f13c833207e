pub mod destroy;
pub mod list;
pub mod refresh;
pub mod server;
pub mod service;
pub mod show;
pub mod up;

// Internal "interpreter" for `Action`.
// We keep the match in a separate module so `mod.rs` stays small as more actions are added.
mod run;

pub use self::service::{Engine, ServiceArgs, SiteArgs};

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Up(up::Args),
    Refresh(SiteArgs),
    Destroy(SiteArgs),
    List(list::Args),
    Show(SiteArgs),
}

impl Action {
    // Convenience wrapper so call sites can do `action.execute().await`.
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
