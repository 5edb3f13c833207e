use crate::stacks::{
    provider::{MemoryProvider, Provider, PulumiConfig, PulumiProvider},
    store::{MemoryStore, PostgresStore, StackStore},
    AcquirePolicy, ConcurrencyGuard, ControllerConfig, LifecycleController, ResolverConfig,
    Resolver, SiteService, StackRegistry,
};
use anyhow::{anyhow, Context, Result};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;

/// Engine adapter selected with `--provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Pulumi,
    Memory,
}

impl Engine {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pulumi => "pulumi",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for Engine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pulumi" => Ok(Self::Pulumi),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown provider: {other}")),
        }
    }
}

/// Everything needed to assemble a [`SiteService`].
#[derive(Debug, Clone)]
pub struct ServiceArgs {
    pub engine: Engine,
    pub pulumi: PulumiConfig,
    pub dsn: Option<String>,
    pub resolver: ResolverConfig,
    pub lease_wait: Duration,
    pub read_during_write: bool,
}

impl ServiceArgs {
    /// Connect the store and wire engine, guard, controller and resolver.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable or its schema cannot
    /// be created.
    pub async fn build(&self) -> Result<Arc<SiteService>> {
        let store: Arc<dyn StackStore> = match &self.dsn {
            Some(dsn) => Arc::new(
                PostgresStore::new(dsn)
                    .await
                    .context("Failed to connect to database")?,
            ),
            None => {
                warn!("No --dsn given, the stack registry is kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let provider: Arc<dyn Provider> = match self.engine {
            Engine::Pulumi => Arc::new(PulumiProvider::new(self.pulumi.clone())),
            Engine::Memory => Arc::new(MemoryProvider::new()),
        };

        let controller = LifecycleController::new(
            StackRegistry::new(store),
            ConcurrencyGuard::new(AcquirePolicy::from_wait(self.lease_wait)),
            provider,
            ControllerConfig::default().with_read_during_write(self.read_during_write),
        );

        debug!(
            engine = self.engine.as_str(),
            store = controller.registry().backend(),
            "site service ready"
        );

        Ok(Arc::new(SiteService::new(
            controller,
            Resolver::new(self.resolver.clone()),
        )))
    }

    /// Key/value pairs describing this configuration, secrets redacted.
    #[must_use]
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let or_none = |value: Option<&String>| value.cloned().unwrap_or_else(|| "none".to_string());

        vec![
            ("provider", self.engine.as_str().to_string()),
            ("work_dir", self.pulumi.work_dir.display().to_string()),
            ("pulumi_bin", self.pulumi.binary.display().to_string()),
            ("pulumi_backend_url", or_none(self.pulumi.backend_url.as_ref())),
            (
                "pulumi_passphrase_set",
                self.pulumi.passphrase.is_some().to_string(),
            ),
            (
                "azure_native_version",
                self.pulumi.azure_native_version.clone(),
            ),
            (
                "dsn",
                self.dsn
                    .as_deref()
                    .map_or_else(|| "memory".to_string(), redact_dsn),
            ),
            ("location", or_none(self.resolver.location.as_ref())),
            ("subscription_id", or_none(self.resolver.subscription_id.as_ref())),
            ("index_document", self.resolver.index_document.clone()),
            ("error_document", self.resolver.error_document.clone()),
            ("lease_wait_ms", self.lease_wait.as_millis().to_string()),
            ("read_during_write", self.read_during_write.to_string()),
        ]
    }
}

/// Arguments shared by commands that target one site.
#[derive(Debug, Clone)]
pub struct SiteArgs {
    pub service: ServiceArgs,
    pub project: String,
    pub site: String,
}

pub(crate) fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
