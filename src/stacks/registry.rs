//! Stack identity registry.
//!
//! Maps `(project, site)` pairs to [`StackHandle`]s and tracks which stacks
//! exist. Transitions are only called by the controller while it holds the
//! stack's lease.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::error::{StackError, StackResult};
use super::resolver::SiteSpec;
use super::store::StackStore;
use super::types::{Outputs, ProjectName, Site, SiteName, SiteStatus, StackHandle, StackRecord};

#[derive(Clone)]
pub struct StackRegistry {
    store: Arc<dyn StackStore>,
}

impl fmt::Debug for StackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackRegistry")
            .field("store", &self.store.backend())
            .finish()
    }
}

impl StackRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn StackStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Resolve the handle for a pair. Pure: no store access.
    #[must_use]
    pub fn resolve(&self, project: &ProjectName, site: &SiteName) -> StackHandle {
        StackHandle::new(project.clone(), site.clone())
    }

    /// Sites of a project.
    ///
    /// # Errors
    /// Returns [`StackError::ProjectNotFound`] until a stack under `project`
    /// has been created successfully.
    pub async fn list(&self, project: &ProjectName) -> StackResult<Vec<Site>> {
        if !self.store.project_exists(project).await? {
            return Err(StackError::ProjectNotFound {
                project: project.clone(),
            });
        }

        let records = self.store.list_by_project(project).await?;
        Ok(records.iter().map(Site::from).collect())
    }

    /// # Errors
    /// Returns a storage error if the backend fails.
    pub async fn get(&self, handle: &StackHandle) -> StackResult<Option<StackRecord>> {
        self.store.get(handle).await
    }

    /// # Errors
    /// Returns a storage error if the backend fails.
    pub async fn exists(&self, handle: &StackHandle) -> StackResult<bool> {
        Ok(self.store.get(handle).await?.is_some())
    }

    /// Current status, [`SiteStatus::Absent`] when no record exists.
    ///
    /// # Errors
    /// Returns a storage error if the backend fails.
    pub async fn status(&self, handle: &StackHandle) -> StackResult<SiteStatus> {
        Ok(self
            .store
            .get(handle)
            .await?
            .map_or(SiteStatus::Absent, |record| record.status))
    }

    /// Move a stack into an in-progress status.
    ///
    /// Inserts a fresh record when the stack is absent, otherwise keeps the
    /// existing record and only changes its status.
    pub(crate) async fn begin(
        &self,
        handle: &StackHandle,
        status: SiteStatus,
        spec: &SiteSpec,
    ) -> StackResult<StackRecord> {
        let record = match self.store.get(handle).await? {
            Some(mut record) => {
                record.status = status;
                record.updated_at = Utc::now();
                record
            }
            None => StackRecord::new(handle.clone(), status, spec.clone()),
        };

        self.store.put(&record).await?;
        debug!(stack = %handle, %status, "stack transition");
        Ok(record)
    }

    /// Record a successful apply: Active with fresh outputs.
    pub(crate) async fn commit(
        &self,
        mut record: StackRecord,
        spec: Option<SiteSpec>,
        outputs: Outputs,
        plan_digest: Option<String>,
    ) -> StackResult<StackRecord> {
        record.status = SiteStatus::Active;
        if let Some(spec) = spec {
            record.spec = spec;
        }
        record.outputs = Some(outputs);
        if plan_digest.is_some() {
            record.plan_digest = plan_digest;
        }
        record.updated_at = Utc::now();

        self.store.put(&record).await?;
        debug!(stack = %record.handle, "stack active");
        Ok(record)
    }

    /// Put back a record saved before a failed operation.
    pub(crate) async fn restore(&self, record: &StackRecord) -> StackResult<()> {
        self.store.put(record).await?;
        debug!(stack = %record.handle, status = %record.status, "stack restored");
        Ok(())
    }

    /// Forget a stack. It becomes absent; its project stays known.
    pub(crate) async fn remove(&self, handle: &StackHandle) -> StackResult<()> {
        self.store.delete(handle).await?;
        debug!(stack = %handle, "stack absent");
        Ok(())
    }
}
