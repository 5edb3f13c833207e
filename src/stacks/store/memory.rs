//! In-memory stack store.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::StackStore;
use crate::stacks::error::{StackError, StackResult};
use crate::stacks::types::{ProjectName, SiteStatus, StackHandle, StackRecord};

/// In-memory stack store.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stacks: RwLock<HashMap<StackHandle, StackRecord>>,
    projects: RwLock<HashSet<ProjectName>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StackStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, handle: &StackHandle) -> StackResult<Option<StackRecord>> {
        let stacks = self
            .stacks
            .read()
            .map_err(|_| StackError::storage("lock poisoned"))?;

        Ok(stacks.get(handle).cloned())
    }

    async fn put(&self, record: &StackRecord) -> StackResult<()> {
        if record.status == SiteStatus::Active {
            self.projects
                .write()
                .map_err(|_| StackError::storage("lock poisoned"))?
                .insert(record.handle.project().clone());
        }

        self.stacks
            .write()
            .map_err(|_| StackError::storage("lock poisoned"))?
            .insert(record.handle.clone(), record.clone());

        Ok(())
    }

    async fn delete(&self, handle: &StackHandle) -> StackResult<bool> {
        let mut stacks = self
            .stacks
            .write()
            .map_err(|_| StackError::storage("lock poisoned"))?;

        Ok(stacks.remove(handle).is_some())
    }

    async fn list_by_project(&self, project: &ProjectName) -> StackResult<Vec<StackRecord>> {
        let stacks = self
            .stacks
            .read()
            .map_err(|_| StackError::storage("lock poisoned"))?;

        Ok(stacks
            .values()
            .filter(|record| record.handle.project() == project)
            .cloned()
            .collect())
    }

    async fn project_exists(&self, project: &ProjectName) -> StackResult<bool> {
        let projects = self
            .projects
            .read()
            .map_err(|_| StackError::storage("lock poisoned"))?;

        Ok(projects.contains(project))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::resolver::SiteSpec;
    use crate::stacks::types::SiteName;

    fn record(project: &str, site: &str) -> StackRecord {
        record_with(project, site, SiteStatus::Active)
    }

    fn record_with(project: &str, site: &str, status: SiteStatus) -> StackRecord {
        StackRecord::new(
            StackHandle::new(
                ProjectName::new_unchecked(project),
                SiteName::new_unchecked(site),
            ),
            status,
            SiteSpec::default(),
        )
    }

    #[tokio::test]
    async fn put_get_delete() -> StackResult<()> {
        let store = MemoryStore::new();
        let blog = record("acme", "blog");

        assert!(store.get(&blog.handle).await?.is_none());
        store.put(&blog).await?;
        assert_eq!(
            store.get(&blog.handle).await?.map(|r| r.status),
            Some(SiteStatus::Active)
        );

        assert!(store.delete(&blog.handle).await?);
        assert!(!store.delete(&blog.handle).await?);
        assert!(store.get(&blog.handle).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn projects_outlive_their_stacks() -> StackResult<()> {
        let store = MemoryStore::new();
        let acme = ProjectName::new_unchecked("acme");
        assert!(!store.project_exists(&acme).await?);

        let blog = record("acme", "blog");
        store.put(&blog).await?;
        store.put(&record("acme", "docs")).await?;
        store.put(&record("other", "blog")).await?;
        assert_eq!(store.list_by_project(&acme).await?.len(), 2);

        store.delete(&blog.handle).await?;
        assert!(store.project_exists(&acme).await?);
        assert_eq!(store.list_by_project(&acme).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn project_known_once_a_stack_is_active() -> StackResult<()> {
        let store = MemoryStore::new();
        let acme = ProjectName::new_unchecked("acme");

        let provisioning = record_with("acme", "blog", SiteStatus::Provisioning);
        store.put(&provisioning).await?;
        assert!(!store.project_exists(&acme).await?);

        // a failed first create clears its record
        store.delete(&provisioning.handle).await?;
        assert!(!store.project_exists(&acme).await?);

        store.put(&record("acme", "blog")).await?;
        assert!(store.project_exists(&acme).await?);
        Ok(())
    }
}
