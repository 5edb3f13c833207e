use crate::{api, cli::actions::ServiceArgs};
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub service: ServiceArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the registry store cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let service = args.service.build().await?;

    api::new(args.port, service).await
}

fn log_startup_args(args: &Args) {
    let mut entries = vec![("listen", format!("tcp:{}", args.port))];
    entries.extend(args.service.describe());
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", sitestack_banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn sitestack_banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    SITESTACK_BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed).to_string()
}

const SITESTACK_BANNER: &str = r"
   _______
  |_______|
  |_______|  S I T E S T A C K {VERSION}
  |_______|";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit(" abc "), "abc");
        assert_eq!(short_commit("unknown"), "unknown");
    }

    #[test]
    fn test_banner_has_version() {
        assert!(sitestack_banner().contains(env!("CARGO_PKG_VERSION")));
    }
}
