use clap::{Arg, Command};

use crate::stacks::resolver::{DEFAULT_ERROR_DOCUMENT, DEFAULT_INDEX_DOCUMENT};

/// Defaults applied to site specs that leave a setting unset.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("location")
                .long("location")
                .help("Azure region for new sites, example: westeurope")
                .env("SITESTACK_LOCATION")
                .global(true),
        )
        .arg(
            Arg::new("subscription-id")
                .long("subscription-id")
                .help("Azure subscription for new sites")
                .env("SITESTACK_SUBSCRIPTION_ID")
                .global(true),
        )
        .arg(
            Arg::new("index-document")
                .long("index-document")
                .help("Name of the index page")
                .env("SITESTACK_INDEX_DOCUMENT")
                .global(true)
                .default_value(DEFAULT_INDEX_DOCUMENT),
        )
        .arg(
            Arg::new("error-document")
                .long("error-document")
                .help("Name of the page served for missing paths")
                .env("SITESTACK_ERROR_DOCUMENT")
                .global(true)
                .default_value(DEFAULT_ERROR_DOCUMENT),
        )
}
