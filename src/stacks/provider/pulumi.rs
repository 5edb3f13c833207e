//! Provider driving the `pulumi` CLI.
//!
//! Each stack gets its own project directory under the configured work dir
//! holding a generated YAML program. JSON is valid YAML, so the program is
//! written with `serde_json`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command as TokioCommand;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::{Applied, Provider, ProviderError};
use crate::stacks::resolver::ResourcePlan;
use crate::stacks::types::{ChangeSummary, Outputs, StackHandle};

pub const DEFAULT_AZURE_NATIVE_VERSION: &str = "v1.86.0";

const STDERR_TAIL_LINES: usize = 5;

/// Settings for [`PulumiProvider`].
#[derive(Debug, Clone)]
pub struct PulumiConfig {
    /// Path or name of the `pulumi` executable.
    pub binary: PathBuf,
    /// Root directory holding one project directory per stack.
    pub work_dir: PathBuf,
    /// State backend, e.g. `file:///var/lib/sitestack` or `azblob://state`.
    pub backend_url: Option<String>,
    /// Passphrase for the passphrase secrets provider.
    pub passphrase: Option<SecretString>,
    pub azure_native_version: String,
    /// Upper bound for a single CLI invocation.
    pub command_timeout: Duration,
}

impl PulumiConfig {
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("pulumi"),
            work_dir: work_dir.into(),
            backend_url: None,
            passphrase: None,
            azure_native_version: DEFAULT_AZURE_NATIVE_VERSION.to_string(),
            command_timeout: Duration::from_secs(30 * 60),
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    #[must_use]
    pub fn with_azure_native_version(mut self, version: impl Into<String>) -> Self {
        self.azure_native_version = version.into();
        self
    }

    #[must_use]
    pub const fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = limit;
        self
    }
}

/// Engine adapter shelling out to the `pulumi` CLI.
#[derive(Debug)]
pub struct PulumiProvider {
    config: PulumiConfig,
    plugin: OnceCell<()>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntry {
    #[serde(default)]
    resource_changes: ChangeCounts,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeCounts {
    #[serde(default)]
    create: u32,
    #[serde(default)]
    update: u32,
    #[serde(default)]
    delete: u32,
    #[serde(default)]
    same: u32,
}

impl PulumiProvider {
    #[must_use]
    pub fn new(config: PulumiConfig) -> Self {
        Self {
            config,
            plugin: OnceCell::new(),
        }
    }

    /// Project directory for a stack.
    #[must_use]
    pub fn stack_dir(&self, handle: &StackHandle) -> PathBuf {
        self.config
            .work_dir
            .join(handle.project().as_str())
            .join(handle.site().as_str())
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, ProviderError> {
        let mut cmd = TokioCommand::new(&self.config.binary);
        cmd.args(args)
            .current_dir(dir)
            .env("PULUMI_SKIP_UPDATE_CHECK", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(url) = &self.config.backend_url {
            cmd.env("PULUMI_BACKEND_URL", url);
        }
        if let Some(passphrase) = &self.config.passphrase {
            cmd.env("PULUMI_CONFIG_PASSPHRASE", passphrase.expose_secret());
        }

        debug!(dir = %dir.display(), ?args, "running pulumi");

        let output = match timeout(self.config.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProviderError::failed(format!(
                    "failed to spawn {}: {e}",
                    self.config.binary.display()
                )));
            }
            Err(_) => {
                return Err(ProviderError::failed(format!(
                    "pulumi {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    self.config.command_timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                code = output.status.code().unwrap_or(-1),
                "pulumi {} failed",
                args.first().copied().unwrap_or_default()
            );
            Err(classify(&stderr))
        }
    }

    async fn ensure_plugin(&self) -> Result<(), ProviderError> {
        self.plugin
            .get_or_try_init(|| async move {
                tokio::fs::create_dir_all(&self.config.work_dir)
                    .await
                    .map_err(|e| ProviderError::failed(format!("work dir: {e}")))?;

                info!(version = %self.config.azure_native_version, "installing azure-native plugin");
                self.run(
                    &self.config.work_dir,
                    &[
                        "plugin",
                        "install",
                        "resource",
                        "azure-native",
                        self.config.azure_native_version.as_str(),
                    ],
                )
                .await
                .map(|_| ())
            })
            .await
            .map(|_| ())
    }

    /// Write the project file, creating the stack directory when missing.
    async fn write_project(
        &self,
        handle: &StackHandle,
        program: &Value,
    ) -> Result<PathBuf, ProviderError> {
        let dir = self.stack_dir(handle);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProviderError::failed(format!("stack dir {}: {e}", dir.display())))?;

        let body = serde_json::to_vec_pretty(program)
            .map_err(|e| ProviderError::failed(format!("program: {e}")))?;
        tokio::fs::write(dir.join("Pulumi.yaml"), body)
            .await
            .map_err(|e| ProviderError::failed(format!("Pulumi.yaml: {e}")))?;

        Ok(dir)
    }

    /// Directory usable for state-only commands (destroy, output, refresh).
    ///
    /// Those commands work from the backend state, so an empty program is
    /// enough when the directory was lost.
    async fn state_dir(&self, handle: &StackHandle) -> Result<PathBuf, ProviderError> {
        let dir = self.stack_dir(handle);
        if tokio::fs::try_exists(dir.join("Pulumi.yaml"))
            .await
            .unwrap_or(false)
        {
            return Ok(dir);
        }
        self.write_project(handle, &empty_program(handle)).await
    }

    async fn read_outputs(&self, dir: &Path, stack: &str) -> Result<Outputs, ProviderError> {
        let stdout = self
            .run(dir, &["stack", "output", "--json", "--stack", stack])
            .await?;
        parse_outputs(&stdout)
    }

    async fn last_changes(&self, dir: &Path, stack: &str) -> ChangeSummary {
        let history = self
            .run(
                dir,
                &["stack", "history", "--json", "--page-size", "1", "--stack", stack],
            )
            .await;

        match history.map(|stdout| serde_json::from_str::<Vec<HistoryEntry>>(&stdout)) {
            Ok(Ok(entries)) => entries
                .into_iter()
                .next()
                .map(|entry| ChangeSummary {
                    create: entry.resource_changes.create,
                    update: entry.resource_changes.update,
                    delete: entry.resource_changes.delete,
                    same: entry.resource_changes.same,
                })
                .unwrap_or_default(),
            Ok(Err(e)) => {
                warn!("could not parse stack history: {e}");
                ChangeSummary::default()
            }
            Err(e) => {
                warn!("could not read stack history: {e}");
                ChangeSummary::default()
            }
        }
    }
}

/// Map CLI stderr onto the provider taxonomy.
#[must_use]
pub fn classify(stderr: &str) -> ProviderError {
    let lower = stderr.to_lowercase();

    if lower.contains("no stack named") {
        ProviderError::NotFound
    } else if lower.contains("another update is currently in progress") || lower.contains("[409]")
    {
        ProviderError::ConcurrentOperation
    } else if lower.contains("already exists") {
        ProviderError::AlreadyExists
    } else {
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        if tail.is_empty() {
            ProviderError::failed("pulumi exited with an error")
        } else {
            ProviderError::Failed(tail)
        }
    }
}

fn parse_outputs(stdout: &str) -> Result<Outputs, ProviderError> {
    serde_json::from_str::<Outputs>(stdout)
        .map_err(|e| ProviderError::failed(format!("unexpected stack outputs: {e}")))
}

fn empty_program(handle: &StackHandle) -> Value {
    json!({
        "name": handle.project().as_str(),
        "runtime": "yaml",
    })
}

/// Render the plan as a Pulumi YAML program.
#[must_use]
pub fn program(plan: &ResourcePlan) -> Value {
    let account = &plan.storage_account;
    let website = &plan.static_website;

    let mut resources = serde_json::Map::new();
    resources.insert(
        "resourceGroup".to_string(),
        json!({
            "type": "azure-native:resources:ResourceGroup",
            "name": plan.resource_group.name,
            "properties": { "resourceGroupName": plan.resource_group.name },
        }),
    );
    resources.insert(
        "storageAccount".to_string(),
        json!({
            "type": "azure-native:storage:StorageAccount",
            "name": account.name,
            "properties": {
                "accountName": account.name,
                "resourceGroupName": "${resourceGroup.name}",
                "kind": account.kind,
                "sku": { "name": account.sku },
                "accessTier": account.access_tier,
                "minimumTlsVersion": account.minimum_tls_version,
                "enableHttpsTrafficOnly": account.enable_https_traffic_only,
                "allowBlobPublicAccess": account.allow_blob_public_access,
                "allowSharedKeyAccess": account.allow_shared_key_access,
            },
        }),
    );
    resources.insert(
        "staticWebsite".to_string(),
        json!({
            "type": "azure-native:storage:StorageAccountStaticWebsite",
            "name": website.name,
            "properties": {
                "accountName": "${storageAccount.name}",
                "resourceGroupName": "${resourceGroup.name}",
                "indexDocument": website.index_document,
                "error404Document": website.error404_document,
            },
        }),
    );
    for (index, blob) in plan.blobs.iter().enumerate() {
        resources.insert(
            format!("blob{index}"),
            json!({
                "type": "azure-native:storage:Blob",
                "name": blob.name,
                "properties": {
                    "blobName": blob.name,
                    "accountName": "${storageAccount.name}",
                    "resourceGroupName": "${resourceGroup.name}",
                    "containerName": "${staticWebsite.containerName}",
                    "contentType": blob.content_type,
                    "source": { "fn::stringAsset": blob.source },
                },
            }),
        );
    }

    json!({
        "name": plan.handle().project().as_str(),
        "runtime": "yaml",
        "description": plan.component,
        "resources": resources,
        "outputs": { "staticEndpoint": "${storageAccount.primaryEndpoints.web}" },
    })
}

#[async_trait]
impl Provider for PulumiProvider {
    fn name(&self) -> &'static str {
        "pulumi"
    }

    #[instrument(skip(self, plan), fields(stack = %plan.handle()))]
    async fn apply(&self, plan: &ResourcePlan) -> Result<Applied, ProviderError> {
        self.ensure_plugin().await?;

        let handle = plan.handle();
        let stack = handle.site().as_str();
        let dir = self.write_project(handle, &program(plan)).await?;

        self.run(&dir, &["stack", "select", "--create", stack])
            .await?;
        self.run(
            &dir,
            &[
                "config",
                "set",
                "azure-native:location",
                plan.location.as_str(),
                "--stack",
                stack,
            ],
        )
        .await?;
        self.run(
            &dir,
            &[
                "config",
                "set",
                "azure-native:subscriptionId",
                plan.subscription_id.as_str(),
                "--stack",
                stack,
            ],
        )
        .await?;

        info!("updating stack");
        self.run(
            &dir,
            &["up", "--yes", "--skip-preview", "--non-interactive", "--stack", stack],
        )
        .await?;

        let changes = self.last_changes(&dir, stack).await;
        let outputs = self.read_outputs(&dir, stack).await?;

        Ok(Applied { outputs, changes })
    }

    #[instrument(skip(self), fields(stack = %handle))]
    async fn destroy(&self, handle: &StackHandle) -> Result<(), ProviderError> {
        let dir = self.state_dir(handle).await?;
        let stack = handle.site().as_str();

        info!("destroying stack");
        self.run(
            &dir,
            &["destroy", "--yes", "--skip-preview", "--non-interactive", "--stack", stack],
        )
        .await?;
        self.run(&dir, &["stack", "rm", "--yes", "--stack", stack])
            .await?;

        Ok(())
    }

    async fn outputs(&self, handle: &StackHandle) -> Result<Outputs, ProviderError> {
        let dir = self.state_dir(handle).await?;
        self.read_outputs(&dir, handle.site().as_str()).await
    }

    #[instrument(skip(self), fields(stack = %handle))]
    async fn refresh(&self, handle: &StackHandle) -> Result<Outputs, ProviderError> {
        let dir = self.state_dir(handle).await?;
        let stack = handle.site().as_str();

        info!("refreshing stack");
        self.run(
            &dir,
            &["refresh", "--yes", "--skip-preview", "--non-interactive", "--stack", stack],
        )
        .await?;

        self.read_outputs(&dir, stack).await
    }
}
