use clap::{Arg, Command};

use crate::stacks::provider::DEFAULT_AZURE_NATIVE_VERSION;

/// Engine adapter selection and Pulumi CLI settings.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("provider")
                .long("provider")
                .help("Infrastructure engine")
                .env("SITESTACK_PROVIDER")
                .global(true)
                .default_value("pulumi")
                .value_parser(["pulumi", "memory"]),
        )
        .arg(
            Arg::new("work-dir")
                .long("work-dir")
                .help("Directory holding one Pulumi project per site")
                .env("SITESTACK_WORK_DIR")
                .global(true)
                .default_value(".sitestack"),
        )
        .arg(
            Arg::new("pulumi-bin")
                .long("pulumi-bin")
                .help("Pulumi CLI binary")
                .env("SITESTACK_PULUMI_BIN")
                .global(true)
                .default_value("pulumi"),
        )
        .arg(
            Arg::new("pulumi-backend-url")
                .long("pulumi-backend-url")
                .help("Pulumi state backend, example: file:///var/lib/sitestack/state")
                .env("SITESTACK_PULUMI_BACKEND_URL")
                .global(true),
        )
        .arg(
            Arg::new("pulumi-passphrase")
                .long("pulumi-passphrase")
                .help("Passphrase protecting stack secrets")
                .env("SITESTACK_PULUMI_PASSPHRASE")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new("azure-native-version")
                .long("azure-native-version")
                .help("azure-native plugin version")
                .env("SITESTACK_AZURE_NATIVE_VERSION")
                .global(true)
                .default_value(DEFAULT_AZURE_NATIVE_VERSION),
        )
        .arg(
            Arg::new("engine-timeout")
                .long("engine-timeout")
                .help("Seconds before a single Pulumi command is killed")
                .env("SITESTACK_ENGINE_TIMEOUT")
                .global(true)
                .default_value("1800")
                .value_parser(clap::value_parser!(u64)),
        )
}
