//! Site-level operations on top of the lifecycle controller.
//!
//! Takes raw names and specs from the HTTP and CLI surfaces, validates them
//! and resolves plans before handing off to the controller.

use std::sync::Arc;

use tracing::debug;

use super::controller::{Deployment, LifecycleController};
use super::error::{FieldError, StackError, StackResult};
use super::journal::LifecycleOperation;
use super::registry::StackRegistry;
use super::resolver::{Resolver, SiteContent, SiteSpec};
use super::types::{ProjectName, Site, SiteName, StackHandle};

#[derive(Debug, Clone)]
pub struct SiteService {
    controller: LifecycleController,
    resolver: Arc<Resolver>,
}

fn parse_project(project: &str) -> StackResult<ProjectName> {
    ProjectName::parse(project)
        .map_err(|reason| StackError::InvalidSpec(vec![FieldError::new("project", reason)]))
}

fn parse_handle(project: &str, site: &str) -> StackResult<StackHandle> {
    let mut errors = Vec::new();
    let project = ProjectName::parse(project)
        .map_err(|reason| errors.push(FieldError::new("project", reason)))
        .ok();
    let site = SiteName::parse(site)
        .map_err(|reason| errors.push(FieldError::new("site", reason)))
        .ok();

    match (project, site) {
        (Some(project), Some(site)) => Ok(StackHandle::new(project, site)),
        _ => Err(StackError::InvalidSpec(errors)),
    }
}

impl SiteService {
    #[must_use]
    pub fn new(controller: LifecycleController, resolver: Resolver) -> Self {
        Self {
            controller,
            resolver: Arc::new(resolver),
        }
    }

    #[must_use]
    pub const fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn registry(&self) -> &StackRegistry {
        self.controller.registry()
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.controller.provider_name()
    }

    #[must_use]
    pub fn store_backend(&self) -> &'static str {
        self.registry().backend()
    }

    /// # Errors
    /// `InvalidSpec` for a malformed name, `NotFound` for an unknown project.
    pub async fn list_sites(&self, project: &str) -> StackResult<Vec<Site>> {
        let project = parse_project(project)?;
        self.registry().list(&project).await
    }

    /// # Errors
    /// `NotFound` when absent, `Conflict` while an operation holds the site.
    pub async fn get_site(&self, project: &str, site: &str) -> StackResult<Site> {
        let handle = parse_handle(project, site)?;
        let record = self.controller.read(&handle).await?;
        Ok(Site::from(&record))
    }

    /// Provision a new site.
    ///
    /// # Errors
    /// `InvalidSpec` listing every rejected field, then any create error.
    pub async fn create_site(&self, spec: &SiteSpec) -> StackResult<Deployment> {
        let plan = self.resolver.resolve(spec)?;
        let handle = plan.handle().clone();
        self.controller.create(&handle, plan).await
    }

    /// Replace the content of an existing site, keeping the rest of its
    /// last applied spec.
    ///
    /// # Errors
    /// `NotFound` when absent, `InvalidSpec` for empty content, then any
    /// update error.
    pub async fn update_site(
        &self,
        project: &str,
        site: &str,
        content: SiteContent,
    ) -> StackResult<Deployment> {
        let handle = parse_handle(project, site)?;
        let record = self
            .registry()
            .get(&handle)
            .await?
            .ok_or_else(|| StackError::not_found(&handle))?;

        let spec = record.spec.with_content(content);
        let plan = self.resolver.resolve(&spec)?;
        self.controller.update(&handle, plan).await
    }

    /// Create the site when absent, update it otherwise.
    ///
    /// # Errors
    /// Any create or update error.
    pub async fn upsert_site(&self, spec: &SiteSpec) -> StackResult<Deployment> {
        let plan = self.resolver.resolve(spec)?;
        let handle = plan.handle().clone();

        if self.registry().exists(&handle).await? {
            debug!(stack = %handle, "site exists, updating");
            self.controller.update(&handle, plan).await
        } else {
            debug!(stack = %handle, "site absent, creating");
            self.controller.create(&handle, plan).await
        }
    }

    /// # Errors
    /// `NotFound` when absent, `Conflict` while busy, then any destroy error.
    pub async fn delete_site(&self, project: &str, site: &str) -> StackResult<()> {
        let handle = parse_handle(project, site)?;
        self.controller.destroy(&handle).await
    }

    /// # Errors
    /// `NotFound` when absent, `Conflict` while busy, then any refresh error.
    pub async fn refresh_site(&self, project: &str, site: &str) -> StackResult<Site> {
        let handle = parse_handle(project, site)?;
        let record = self.controller.refresh(&handle).await?;
        Ok(Site::from(&record))
    }

    /// Make sure the registry knows a site the engine already runs.
    ///
    /// # Errors
    /// `NotFound` when the engine has no such site, `Conflict` while busy.
    pub async fn adopt_site(&self, project: &str, site: &str) -> StackResult<Site> {
        let handle = parse_handle(project, site)?;
        let record = self.controller.adopt(&handle).await?;
        Ok(Site::from(&record))
    }

    /// # Errors
    /// `InvalidSpec` for a malformed name.
    pub fn site_operations(
        &self,
        project: &str,
        site: &str,
    ) -> StackResult<Vec<LifecycleOperation>> {
        let handle = parse_handle(project, site)?;
        Ok(self.controller.operations(&handle))
    }
}
