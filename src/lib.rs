//! # Sitestack
//!
//! `sitestack` provisions, updates and tears down static websites, one
//! infrastructure stack per `(project, site)` pair.
//!
//! ## Lifecycle
//!
//! Each stack moves through `Absent`, `Provisioning`, `Active`, `Updating`
//! and `Destroying`. Only one operation may run against a stack at a time;
//! a second one is rejected with a conflict, or waits in line when a lease
//! wait is configured.
//! A failed operation puts the stack back where it was.
//!
//! ## Engines
//!
//! Resources are created by a pluggable engine:
//!
//! - `pulumi`: drives the Pulumi CLI with a generated YAML program that
//!   creates a resource group, a storage account with static website
//!   hosting, and the index and error pages.
//! - `memory`: in-process, for development and tests.
//!
//! ## Surfaces
//!
//! The same operations are exposed over HTTP (`sitestack server`) and as
//! one-shot CLI subcommands (`up`, `refresh`, `destroy`, `list`, `show`).

pub mod api;
pub mod cli;
pub mod stacks;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash() {
        assert!(
            GIT_COMMIT_HASH == "unknown"
                || GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit())
        );
    }
}
