use crate::{
    cli::actions::{list, server, up, Action, Engine, ServiceArgs, SiteArgs},
    stacks::{provider::PulumiConfig, ResolverConfig},
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}

fn service_args(matches: &ArgMatches) -> Result<ServiceArgs> {
    let engine = required(matches, "provider")?.parse::<Engine>()?;

    let mut pulumi = PulumiConfig::new(required(matches, "work-dir")?)
        .with_binary(required(matches, "pulumi-bin")?)
        .with_azure_native_version(required(matches, "azure-native-version")?)
        .with_command_timeout(Duration::from_secs(
            matches.get_one::<u64>("engine-timeout").copied().unwrap_or(1800),
        ));
    if let Some(url) = matches.get_one::<String>("pulumi-backend-url") {
        pulumi = pulumi.with_backend_url(url);
    }
    if let Some(passphrase) = matches.get_one::<String>("pulumi-passphrase") {
        pulumi = pulumi.with_passphrase(SecretString::from(passphrase.clone()));
    }

    let mut resolver = ResolverConfig::new()
        .with_index_document(required(matches, "index-document")?)
        .with_error_document(required(matches, "error-document")?);
    if let Some(location) = matches.get_one::<String>("location") {
        resolver = resolver.with_location(location);
    }
    if let Some(subscription_id) = matches.get_one::<String>("subscription-id") {
        resolver = resolver.with_subscription_id(subscription_id);
    }

    Ok(ServiceArgs {
        engine,
        pulumi,
        dsn: matches.get_one::<String>("dsn").cloned(),
        resolver,
        lease_wait: Duration::from_millis(
            matches.get_one::<u64>("lease-wait-ms").copied().unwrap_or(0),
        ),
        read_during_write: matches.get_flag("read-during-write"),
    })
}

fn site_args(matches: &ArgMatches) -> Result<SiteArgs> {
    Ok(SiteArgs {
        service: service_args(matches)?,
        project: required(matches, "project")?,
        site: required(matches, "site")?,
    })
}

/// Global arguments propagate into the subcommand, so everything is read
/// from the subcommand's matches.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some(("server", sub_m)) => Ok(Action::Server(server::Args {
            port: sub_m.get_one::<u16>("port").copied().unwrap_or(8080),
            service: service_args(sub_m)?,
        })),
        Some(("up", sub_m)) => Ok(Action::Up(up::Args {
            service: service_args(sub_m)?,
            project: required(sub_m, "project")?,
            site: required(sub_m, "site")?,
            content_file: PathBuf::from(required(sub_m, "content-file")?),
            content404_file: PathBuf::from(required(sub_m, "content404-file")?),
        })),
        Some(("refresh", sub_m)) => Ok(Action::Refresh(site_args(sub_m)?)),
        Some(("destroy", sub_m)) => Ok(Action::Destroy(site_args(sub_m)?)),
        Some(("show", sub_m)) => Ok(Action::Show(site_args(sub_m)?)),
        Some(("list", sub_m)) => Ok(Action::List(list::Args {
            service: service_args(sub_m)?,
            project: required(sub_m, "project")?,
        })),
        _ => anyhow::bail!("unknown command"),
    }
}
