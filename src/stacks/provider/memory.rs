//! In-process engine for development and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::{Applied, Provider, ProviderError};
use crate::stacks::resolver::ResourcePlan;
use crate::stacks::types::{ChangeSummary, Outputs, StackHandle};

/// Simulated engine keeping the last applied plan per stack.
///
/// Applies are idempotent: re-applying an identical plan reports every
/// resource as unchanged.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    deployed: RwLock<HashMap<StackHandle, ResourcePlan>>,
    failures: Mutex<VecDeque<ProviderError>>,
    latency: Option<Duration>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every engine call, simulating a slow deployment.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next engine call fail with `err`. Failures queue in order.
    pub fn fail_next(&self, err: ProviderError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
    }

    /// Number of stacks with live resources.
    #[must_use]
    pub fn deployed_count(&self) -> usize {
        self.deployed.read().map_or(0, |deployed| deployed.len())
    }

    async fn simulate(&self) -> Result<(), ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .failures
            .lock()
            .map_err(|_| ProviderError::failed("lock poisoned"))?
            .pop_front();

        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn endpoint(plan: &ResourcePlan) -> Result<Outputs, ProviderError> {
        let url = format!(
            "https://{}.z6.web.core.windows.net/",
            plan.storage_account.name
        );
        Url::parse(&url)
            .map(Outputs::new)
            .map_err(|e| ProviderError::failed(format!("invalid endpoint {url}: {e}")))
    }
}

/// Count resource changes between the deployed plan and the new one.
fn diff(old: Option<&ResourcePlan>, new: &ResourcePlan) -> ChangeSummary {
    let mut summary = ChangeSummary::default();

    let Some(old) = old else {
        // resource group, storage account, static website, blobs
        summary.create = 3 + u32::try_from(new.blobs.len()).unwrap_or(u32::MAX);
        return summary;
    };

    let tally = |summary: &mut ChangeSummary, changed: bool| {
        if changed {
            summary.update += 1;
        } else {
            summary.same += 1;
        }
    };

    tally(
        &mut summary,
        old.resource_group != new.resource_group || old.location != new.location,
    );
    tally(&mut summary, old.storage_account != new.storage_account);
    tally(&mut summary, old.static_website != new.static_website);

    for blob in &new.blobs {
        match old.blobs.iter().find(|b| b.name == blob.name) {
            Some(previous) => tally(&mut summary, previous != blob),
            None => summary.create += 1,
        }
    }
    for blob in &old.blobs {
        if !new.blobs.iter().any(|b| b.name == blob.name) {
            summary.delete += 1;
        }
    }

    summary
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn apply(&self, plan: &ResourcePlan) -> Result<Applied, ProviderError> {
        self.simulate().await?;

        let outputs = Self::endpoint(plan)?;
        let mut deployed = self
            .deployed
            .write()
            .map_err(|_| ProviderError::failed("lock poisoned"))?;

        let changes = diff(deployed.get(plan.handle()), plan);
        deployed.insert(plan.handle().clone(), plan.clone());

        debug!(stack = %plan.handle(), %changes, "memory apply");

        Ok(Applied { outputs, changes })
    }

    async fn destroy(&self, handle: &StackHandle) -> Result<(), ProviderError> {
        self.simulate().await?;

        self.deployed
            .write()
            .map_err(|_| ProviderError::failed("lock poisoned"))?
            .remove(handle)
            .map(|_| ())
            .ok_or(ProviderError::NotFound)
    }

    async fn outputs(&self, handle: &StackHandle) -> Result<Outputs, ProviderError> {
        let deployed = self
            .deployed
            .read()
            .map_err(|_| ProviderError::failed("lock poisoned"))?;

        deployed
            .get(handle)
            .ok_or(ProviderError::NotFound)
            .and_then(Self::endpoint)
    }

    async fn refresh(&self, handle: &StackHandle) -> Result<Outputs, ProviderError> {
        self.simulate().await?;
        self.outputs(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::resolver::{Resolver, ResolverConfig, SiteSpec};

    fn plan(content: &str) -> ResourcePlan {
        let resolver = Resolver::new(
            ResolverConfig::new()
                .with_location("westeurope")
                .with_subscription_id("6b4ce01c-5368-4bb0-af54-be67444292c2"),
        );
        let spec = SiteSpec {
            project: "acme".to_string(),
            site: "blog".to_string(),
            content: content.to_string(),
            content404: "<h1>404</h1>".to_string(),
            ..SiteSpec::default()
        };
        match resolver.resolve(&spec) {
            Ok(plan) => plan,
            Err(err) => panic!("plan should resolve: {err}"),
        }
    }

    #[tokio::test]
    async fn apply_is_idempotent() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        let plan = plan("<h1>hi</h1>");

        let first = provider.apply(&plan).await?;
        assert_eq!(first.changes.create, 5);

        let second = provider.apply(&plan).await?;
        assert!(second.changes.is_noop());
        assert_eq!(second.changes.same, 5);
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(provider.deployed_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn content_change_updates_one_blob() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        provider.apply(&plan("<h1>hi</h1>")).await?;

        let applied = provider.apply(&plan("<h1>bye</h1>")).await?;
        assert_eq!(applied.changes.update, 1);
        assert_eq!(applied.changes.same, 4);
        Ok(())
    }

    #[tokio::test]
    async fn endpoint_uses_storage_account() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        let plan = plan("<h1>hi</h1>");
        let applied = provider.apply(&plan).await?;

        assert_eq!(
            applied.outputs.endpoint.host_str(),
            Some(format!("{}.z6.web.core.windows.net", plan.storage_account.name).as_str())
        );
        assert_eq!(provider.outputs(plan.handle()).await?, applied.outputs);
        Ok(())
    }

    #[tokio::test]
    async fn destroy_missing_is_not_found() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        let plan = plan("<h1>hi</h1>");
        assert_eq!(
            provider.destroy(plan.handle()).await,
            Err(ProviderError::NotFound)
        );

        provider.apply(&plan).await?;
        provider.destroy(plan.handle()).await?;
        assert_eq!(
            provider.outputs(plan.handle()).await,
            Err(ProviderError::NotFound)
        );
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_fire_once() -> Result<(), ProviderError> {
        let provider = MemoryProvider::new();
        provider.fail_next(ProviderError::ConcurrentOperation);

        let plan = plan("<h1>hi</h1>");
        assert_eq!(
            provider.apply(&plan).await,
            Err(ProviderError::ConcurrentOperation)
        );
        assert_eq!(provider.deployed_count(), 0);
        provider.apply(&plan).await?;
        assert_eq!(provider.deployed_count(), 1);
        Ok(())
    }
}
