//! Lifecycle controller.
//!
//! Orchestrates create, read, update, destroy and refresh for one stack at
//! a time. Every mutation runs while holding the stack's [`Lease`]:
//!
//! ```text
//! Absent --create--> Provisioning --ok--> Active
//! Active --update--> Updating     --ok--> Active
//! Active --destroy-> Destroying   --ok--> Absent
//! in-progress --failure--> previous stable state
//! ```
//!
//! The critical section runs in its own task owning the lease, so a caller
//! that stops waiting cannot release the stack while the engine still works
//! on it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn, Instrument, Span};

use super::error::{FieldError, StackError, StackResult};
use super::guard::{ConcurrencyGuard, Lease};
use super::journal::{Journal, LifecycleOperation, OperationKind, OperationResult};
use super::provider::{Provider, ProviderError};
use super::registry::StackRegistry;
use super::resolver::{ResourcePlan, SiteSpec};
use super::types::{ChangeSummary, Outputs, SiteStatus, StackHandle, StackRecord};

/// Controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Serve reads without taking the lease.
    pub read_during_write: bool,
    pub journal_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            read_during_write: false,
            journal_capacity: super::journal::DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl ControllerConfig {
    #[must_use]
    pub const fn with_read_during_write(mut self, enabled: bool) -> Self {
        self.read_during_write = enabled;
        self
    }

    #[must_use]
    pub const fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }
}

/// A successful create or update.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub record: StackRecord,
    pub changes: ChangeSummary,
}

impl Deployment {
    #[must_use]
    pub fn outputs(&self) -> Option<&Outputs> {
        self.record.outputs.as_ref()
    }
}

impl OperationResult for Deployment {
    fn outputs(&self) -> Option<&Outputs> {
        self.record.outputs.as_ref()
    }
}

#[derive(Clone)]
pub struct LifecycleController {
    registry: StackRegistry,
    guard: ConcurrencyGuard,
    provider: Arc<dyn Provider>,
    journal: Journal,
    config: ControllerConfig,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("registry", &self.registry)
            .field("guard", &self.guard.policy())
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run an engine call in its own task so a panicking adapter surfaces as an
/// error while the caller still holds the lease.
async fn engine<T, Fut>(call: Fut) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(call).await.unwrap_or_else(|join| {
        Err(ProviderError::failed(format!(
            "engine call aborted: {join}"
        )))
    })
}

fn check_plan(handle: &StackHandle, plan: &ResourcePlan) -> StackResult<()> {
    if plan.handle() == handle {
        Ok(())
    } else {
        Err(StackError::InvalidSpec(vec![FieldError::new(
            "site",
            format!("plan targets {} instead of {handle}", plan.handle()),
        )]))
    }
}

impl LifecycleController {
    #[must_use]
    pub fn new(
        registry: StackRegistry,
        guard: ConcurrencyGuard,
        provider: Arc<dyn Provider>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            guard,
            provider,
            journal: Journal::new(config.journal_capacity),
            config,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &StackRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Recent operations on a stack, oldest first.
    #[must_use]
    pub fn operations(&self, handle: &StackHandle) -> Vec<LifecycleOperation> {
        self.journal.for_handle(handle)
    }

    /// Journal an operation refused before it started.
    fn reject<T: OperationResult>(
        &self,
        kind: OperationKind,
        handle: &StackHandle,
        started_at: DateTime<Utc>,
        err: StackError,
    ) -> StackResult<T> {
        let rejected = Err(err);
        self.journal.record(kind, handle, started_at, &rejected);
        rejected
    }

    /// Admit an operation and run it to completion in a task owning the lease.
    ///
    /// With `require_existing`, an absent stack fails `NotFound` before the
    /// lease is requested. The body re-checks existence under the lease.
    async fn run<T, F, Fut>(
        &self,
        kind: OperationKind,
        handle: &StackHandle,
        require_existing: bool,
        body: F,
    ) -> StackResult<T>
    where
        F: FnOnce(Self, Lease) -> Fut,
        Fut: Future<Output = StackResult<T>> + Send + 'static,
        T: OperationResult + Send + 'static,
    {
        let started_at = Utc::now();

        let admitted = async {
            if require_existing && !self.registry.exists(handle).await? {
                return Err(StackError::not_found(handle));
            }
            self.guard.acquire(handle).await
        }
        .await;

        let lease = match admitted {
            Ok(lease) => lease,
            Err(err) => return self.reject(kind, handle, started_at, err),
        };

        let journal = self.journal.clone();
        let task_handle = handle.clone();
        let work = body(self.clone(), lease);
        let task = tokio::spawn(
            async move {
                let result = work.await;
                journal.record(kind, &task_handle, started_at, &result);
                result
            }
            .instrument(Span::current()),
        );

        task.await.unwrap_or_else(|join| {
            error!(operation = %kind, "operation task aborted: {join}");
            Err(StackError::Provider(format!("operation aborted: {join}")))
        })
    }

    /// Create a stack from a plan.
    ///
    /// # Errors
    /// `Conflict` while another operation holds the stack, `AlreadyExists`
    /// when it is not absent, the classified engine error when apply fails.
    /// A failed create leaves the stack absent.
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "create"))]
    pub async fn create(&self, handle: &StackHandle, plan: ResourcePlan) -> StackResult<Deployment> {
        if let Err(err) = check_plan(handle, &plan) {
            return self.reject(OperationKind::Create, handle, Utc::now(), err);
        }

        let handle_owned = handle.clone();
        self.run(OperationKind::Create, handle, false, move |ctl, lease| async move {
            let _lease = lease;
            let handle = handle_owned;

            if ctl.registry.exists(&handle).await? {
                return Err(StackError::already_exists(&handle));
            }

            let record = ctl
                .registry
                .begin(&handle, SiteStatus::Provisioning, plan.spec())
                .await?;

            let provider = ctl.provider.clone();
            let apply_plan = plan.clone();
            let applied = match engine(async move { provider.apply(&apply_plan).await }).await {
                Ok(applied) => applied,
                Err(err) => {
                    warn!("apply failed: {err}");
                    if let Err(cleanup) = ctl.registry.remove(&handle).await {
                        error!("failed to clear record after failed create: {cleanup}");
                    }
                    return Err(StackError::from_provider(&handle, err));
                }
            };

            let record = ctl
                .registry
                .commit(
                    record,
                    Some(plan.spec().clone()),
                    applied.outputs,
                    Some(plan.digest()),
                )
                .await?;

            info!(changes = %applied.changes, "stack created");
            Ok(Deployment {
                record,
                changes: applied.changes,
            })
        })
        .await
    }

    /// Latest known state of a stack, including the outputs of its last
    /// successful apply.
    ///
    /// # Errors
    /// `NotFound` when absent, `Conflict` while another operation holds the
    /// stack (unless reads during writes are enabled).
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "read"))]
    pub async fn read(&self, handle: &StackHandle) -> StackResult<StackRecord> {
        if self.config.read_during_write {
            let started_at = Utc::now();
            let result = self
                .registry
                .get(handle)
                .await
                .and_then(|record| record.ok_or_else(|| StackError::not_found(handle)));
            self.journal
                .record(OperationKind::Read, handle, started_at, &result);
            return result;
        }

        let handle_owned = handle.clone();
        self.run(OperationKind::Read, handle, true, move |ctl, lease| async move {
            let _lease = lease;
            ctl.registry
                .get(&handle_owned)
                .await?
                .ok_or_else(|| StackError::not_found(&handle_owned))
        })
        .await
    }

    /// Apply a new plan to an existing stack.
    ///
    /// # Errors
    /// `NotFound` when absent, `Conflict` while busy, the classified engine
    /// error when apply fails. The previous record is restored on failure.
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "update"))]
    pub async fn update(&self, handle: &StackHandle, plan: ResourcePlan) -> StackResult<Deployment> {
        if let Err(err) = check_plan(handle, &plan) {
            return self.reject(OperationKind::Update, handle, Utc::now(), err);
        }

        let handle_owned = handle.clone();
        self.run(OperationKind::Update, handle, true, move |ctl, lease| async move {
            let _lease = lease;
            let handle = handle_owned;

            let previous = ctl
                .registry
                .get(&handle)
                .await?
                .ok_or_else(|| StackError::not_found(&handle))?;

            let record = ctl
                .registry
                .begin(&handle, SiteStatus::Updating, plan.spec())
                .await?;

            let provider = ctl.provider.clone();
            let apply_plan = plan.clone();
            let applied = match engine(async move { provider.apply(&apply_plan).await }).await {
                Ok(applied) => applied,
                Err(err) => {
                    warn!("apply failed: {err}");
                    if let Err(restore) = ctl.registry.restore(&previous).await {
                        error!("failed to restore record after failed update: {restore}");
                    }
                    return Err(StackError::from_provider(&handle, err));
                }
            };

            let record = ctl
                .registry
                .commit(
                    record,
                    Some(plan.spec().clone()),
                    applied.outputs,
                    Some(plan.digest()),
                )
                .await?;

            info!(changes = %applied.changes, "stack updated");
            Ok(Deployment {
                record,
                changes: applied.changes,
            })
        })
        .await
    }

    /// Tear down a stack.
    ///
    /// An engine report that nothing exists counts as already destroyed.
    ///
    /// # Errors
    /// `NotFound` when absent, `Conflict` while busy, the classified engine
    /// error when destroy fails. The stack stays active on failure.
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "destroy"))]
    pub async fn destroy(&self, handle: &StackHandle) -> StackResult<()> {
        let handle_owned = handle.clone();
        self.run(OperationKind::Destroy, handle, true, move |ctl, lease| async move {
            let _lease = lease;
            let handle = handle_owned;

            let previous = ctl
                .registry
                .get(&handle)
                .await?
                .ok_or_else(|| StackError::not_found(&handle))?;

            ctl.registry
                .begin(&handle, SiteStatus::Destroying, &previous.spec)
                .await?;

            let provider = ctl.provider.clone();
            let target = handle.clone();
            match engine(async move { provider.destroy(&target).await }).await {
                Ok(()) => {}
                Err(ProviderError::NotFound) => {
                    warn!("engine has no resources for the stack, treating as destroyed");
                }
                Err(err) => {
                    warn!("destroy failed: {err}");
                    if let Err(restore) = ctl.registry.restore(&previous).await {
                        error!("failed to restore record after failed destroy: {restore}");
                    }
                    return Err(StackError::from_provider(&handle, err));
                }
            }

            ctl.registry.remove(&handle).await?;
            info!("stack destroyed");
            Ok(())
        })
        .await
    }

    /// Re-sync a stack's outputs from the engine.
    ///
    /// # Errors
    /// `NotFound` when absent, `Conflict` while busy, the classified engine
    /// error when refresh fails. The record is left untouched on failure.
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "refresh"))]
    pub async fn refresh(&self, handle: &StackHandle) -> StackResult<StackRecord> {
        let handle_owned = handle.clone();
        self.run(OperationKind::Refresh, handle, true, move |ctl, lease| async move {
            let _lease = lease;
            let handle = handle_owned;

            let record = ctl
                .registry
                .get(&handle)
                .await?
                .ok_or_else(|| StackError::not_found(&handle))?;

            let provider = ctl.provider.clone();
            let target = handle.clone();
            let outputs = engine(async move { provider.refresh(&target).await })
                .await
                .map_err(|err| StackError::from_provider(&handle, err))?;

            let record = ctl.registry.commit(record, None, outputs, None).await?;
            info!("stack refreshed");
            Ok(record)
        })
        .await
    }

    /// Register a stack the engine already runs but the registry does not
    /// know, e.g. after a restart without a persistent store.
    ///
    /// Returns the existing record untouched when the registry knows it.
    ///
    /// # Errors
    /// `NotFound` when the engine has no such stack, `Conflict` while busy.
    #[instrument(skip_all, fields(project = %handle.project(), site = %handle.site(), operation = "adopt"))]
    pub async fn adopt(&self, handle: &StackHandle) -> StackResult<StackRecord> {
        let handle_owned = handle.clone();
        self.run(OperationKind::Adopt, handle, false, move |ctl, lease| async move {
            let _lease = lease;
            let handle = handle_owned;

            if let Some(record) = ctl.registry.get(&handle).await? {
                return Ok(record);
            }

            let provider = ctl.provider.clone();
            let target = handle.clone();
            let outputs = engine(async move { provider.outputs(&target).await })
                .await
                .map_err(|err| StackError::from_provider(&handle, err))?;

            // content is owned by the engine state; only identity is known here
            let spec = SiteSpec {
                project: handle.project().to_string(),
                site: handle.site().to_string(),
                ..SiteSpec::default()
            };
            let record = ctl
                .registry
                .begin(&handle, SiteStatus::Provisioning, &spec)
                .await?;
            let record = ctl.registry.commit(record, None, outputs, None).await?;

            info!("stack adopted from engine state");
            Ok(record)
        })
        .await
    }
}
