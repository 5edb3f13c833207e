//! Desired-state resolution.
//!
//! [`Resolver::resolve`] is a pure function from a [`SiteSpec`] to a
//! [`ResourcePlan`]. It validates every field up front and reports all
//! problems in a single [`StackError::InvalidSpec`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{FieldError, StackError, StackResult};
use super::types::{ProjectName, SiteName, StackHandle};

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";
pub const DEFAULT_ERROR_DOCUMENT: &str = "error.html";

/// Container that serves static website content.
pub const WEB_CONTAINER: &str = "$web";

const STORAGE_PREFIX_MAX: usize = 14;
const STORAGE_HASH_LEN: usize = 8;

/// Desired configuration of a static site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSpec {
    pub project: String,
    pub site: String,
    /// HTML served as the index document.
    pub content: String,
    /// HTML served for missing paths.
    pub content404: String,
    pub location: Option<String>,
    pub subscription_id: Option<String>,
    pub index_document: Option<String>,
    pub error_document: Option<String>,
}

/// New page content for an existing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContent {
    pub content: String,
    pub content404: String,
}

impl SiteSpec {
    /// Replace the page content, keeping everything else.
    #[must_use]
    pub fn with_content(mut self, content: SiteContent) -> Self {
        self.content = content.content;
        self.content404 = content.content404;
        self
    }
}

/// Defaults applied when a spec leaves a field unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub location: Option<String>,
    pub subscription_id: Option<String>,
    pub index_document: String,
    pub error_document: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            location: None,
            subscription_id: None,
            index_document: DEFAULT_INDEX_DOCUMENT.to_string(),
            error_document: DEFAULT_ERROR_DOCUMENT.to_string(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_subscription_id(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    #[must_use]
    pub fn with_index_document(mut self, document: impl Into<String>) -> Self {
        self.index_document = document.into();
        self
    }

    #[must_use]
    pub fn with_error_document(mut self, document: impl Into<String>) -> Self {
        self.error_document = document.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupPlan {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountPlan {
    pub name: String,
    pub kind: &'static str,
    pub sku: &'static str,
    pub access_tier: &'static str,
    pub minimum_tls_version: &'static str,
    pub enable_https_traffic_only: bool,
    pub allow_blob_public_access: bool,
    pub allow_shared_key_access: bool,
}

impl StorageAccountPlan {
    fn new(name: String) -> Self {
        Self {
            name,
            kind: "StorageV2",
            sku: "Standard_LRS",
            access_tier: "Hot",
            minimum_tls_version: "TLS1_2",
            enable_https_traffic_only: true,
            allow_blob_public_access: true,
            allow_shared_key_access: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticWebsitePlan {
    pub name: String,
    pub index_document: String,
    pub error404_document: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobPlan {
    pub name: String,
    pub container: &'static str,
    pub content_type: &'static str,
    pub source: String,
}

/// Fully resolved set of resources for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePlan {
    #[serde(skip)]
    handle: StackHandle,
    #[serde(skip)]
    spec: SiteSpec,
    pub location: String,
    pub subscription_id: String,
    pub resource_group: ResourceGroupPlan,
    /// Logical name of the component grouping the site resources.
    pub component: String,
    pub storage_account: StorageAccountPlan,
    pub static_website: StaticWebsitePlan,
    pub blobs: Vec<BlobPlan>,
}

impl ResourcePlan {
    #[must_use]
    pub const fn handle(&self) -> &StackHandle {
        &self.handle
    }

    /// The input spec with every default filled in.
    #[must_use]
    pub const fn spec(&self) -> &SiteSpec {
        &self.spec
    }

    /// SHA-256 hex digest of the canonical JSON form.
    #[must_use]
    pub fn digest(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(json))
    }
}

/// Storage account name: lowercase alphanumerics, 3..=24 characters.
///
/// The readable prefix keeps names recognisable, the hash suffix keeps
/// `ab` + `c` and `a` + `bc` from colliding.
#[must_use]
pub fn storage_account_name(handle: &StackHandle) -> String {
    let prefix: String = handle
        .project()
        .as_str()
        .chars()
        .chain(handle.site().as_str().chars())
        .filter(char::is_ascii_alphanumeric)
        .take(STORAGE_PREFIX_MAX)
        .collect();

    let hash = hex::encode(Sha256::digest(handle.to_string().as_bytes()));

    format!("{prefix}{}st", &hash[..STORAGE_HASH_LEN])
}

fn uuid_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
            )
            .ok()
        })
        .as_ref()
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_document(field: &'static str, name: &str, errors: &mut Vec<FieldError>) {
    if name.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if name.contains('/') {
        errors.push(FieldError::new(field, "must not contain '/'"));
    }
}

/// Maps site specs to resource plans.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    #[must_use]
    pub const fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a spec into a plan.
    ///
    /// # Errors
    /// Returns [`StackError::InvalidSpec`] listing every rejected field.
    pub fn resolve(&self, spec: &SiteSpec) -> StackResult<ResourcePlan> {
        let mut errors = Vec::new();

        let project = ProjectName::parse(&spec.project)
            .map_err(|reason| errors.push(FieldError::new("project", reason)))
            .ok();
        let site = SiteName::parse(&spec.site)
            .map_err(|reason| errors.push(FieldError::new("site", reason)))
            .ok();

        if spec.content.is_empty() {
            errors.push(FieldError::new("content", "is required"));
        }
        if spec.content404.is_empty() {
            errors.push(FieldError::new("content404", "is required"));
        }

        let location = non_blank(spec.location.as_ref())
            .or_else(|| non_blank(self.config.location.as_ref()));
        if location.is_none() {
            errors.push(FieldError::new("location", "is required"));
        }

        let subscription_id = non_blank(spec.subscription_id.as_ref())
            .or_else(|| non_blank(self.config.subscription_id.as_ref()));
        match &subscription_id {
            None => errors.push(FieldError::new("subscriptionId", "is required")),
            Some(id) if !uuid_pattern().is_some_and(|re| re.is_match(id)) => {
                errors.push(FieldError::new("subscriptionId", "must be a UUID"));
            }
            Some(_) => {}
        }

        let index_document = spec
            .index_document
            .clone()
            .unwrap_or_else(|| self.config.index_document.clone());
        let error_document = spec
            .error_document
            .clone()
            .unwrap_or_else(|| self.config.error_document.clone());
        check_document("indexDocument", &index_document, &mut errors);
        check_document("errorDocument", &error_document, &mut errors);
        if index_document == error_document {
            errors.push(FieldError::new(
                "errorDocument",
                "must differ from indexDocument",
            ));
        }

        let (Some(project), Some(site), Some(location), Some(subscription_id), true) = (
            project,
            site,
            location,
            subscription_id,
            errors.is_empty(),
        ) else {
            return Err(StackError::InvalidSpec(errors));
        };

        let handle = StackHandle::new(project, site);
        let account = storage_account_name(&handle);
        let base = format!("{}-{}", handle.project(), handle.site());

        let blobs = vec![
            BlobPlan {
                name: index_document.clone(),
                container: WEB_CONTAINER,
                content_type: "text/html",
                source: spec.content.clone(),
            },
            BlobPlan {
                name: error_document.clone(),
                container: WEB_CONTAINER,
                content_type: "text/html",
                source: spec.content404.clone(),
            },
        ];

        let effective = SiteSpec {
            project: handle.project().to_string(),
            site: handle.site().to_string(),
            content: spec.content.clone(),
            content404: spec.content404.clone(),
            location: Some(location.clone()),
            subscription_id: Some(subscription_id.clone()),
            index_document: Some(index_document.clone()),
            error_document: Some(error_document.clone()),
        };

        Ok(ResourcePlan {
            resource_group: ResourceGroupPlan {
                name: format!("{base}-rg"),
            },
            component: format!("{base}-ss"),
            static_website: StaticWebsitePlan {
                name: format!("{account}-sbs"),
                index_document,
                error404_document: error_document,
            },
            storage_account: StorageAccountPlan::new(account),
            blobs,
            location,
            subscription_id,
            spec: effective,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBSCRIPTION: &str = "6b4ce01c-5368-4bb0-af54-be67444292c2";

    fn resolver() -> Resolver {
        Resolver::new(
            ResolverConfig::new()
                .with_location("westeurope")
                .with_subscription_id(SUBSCRIPTION),
        )
    }

    fn spec(project: &str, site: &str) -> SiteSpec {
        SiteSpec {
            project: project.to_string(),
            site: site.to_string(),
            content: "<h1>hi</h1>".to_string(),
            content404: "<h1>404</h1>".to_string(),
            ..SiteSpec::default()
        }
    }

    #[test]
    fn resolves_names_and_defaults() -> StackResult<()> {
        let plan = resolver().resolve(&spec("acme", "blog"))?;

        assert_eq!(plan.resource_group.name, "acme-blog-rg");
        assert_eq!(plan.component, "acme-blog-ss");
        assert!(plan.storage_account.name.starts_with("acmeblog"));
        assert!(plan.storage_account.name.ends_with("st"));
        assert_eq!(
            plan.static_website.name,
            format!("{}-sbs", plan.storage_account.name)
        );
        assert_eq!(plan.location, "westeurope");
        assert_eq!(plan.subscription_id, SUBSCRIPTION);
        assert_eq!(plan.static_website.index_document, "index.html");
        assert_eq!(plan.static_website.error404_document, "error.html");
        assert_eq!(plan.blobs.len(), 2);
        assert!(plan
            .blobs
            .iter()
            .all(|b| b.container == "$web" && b.content_type == "text/html"));
        assert_eq!(plan.spec().location.as_deref(), Some("westeurope"));
        Ok(())
    }

    #[test]
    fn storage_account_settings() -> StackResult<()> {
        let account = resolver().resolve(&spec("acme", "blog"))?.storage_account;
        assert_eq!(account.kind, "StorageV2");
        assert_eq!(account.sku, "Standard_LRS");
        assert_eq!(account.access_tier, "Hot");
        assert_eq!(account.minimum_tls_version, "TLS1_2");
        assert!(account.enable_https_traffic_only);
        assert!(account.allow_blob_public_access);
        assert!(account.allow_shared_key_access);
        Ok(())
    }

    #[test]
    fn resolution_is_deterministic() -> StackResult<()> {
        let a = resolver().resolve(&spec("acme", "blog"))?;
        let b = resolver().resolve(&spec("acme", "blog"))?;
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let mut changed = spec("acme", "blog");
        changed.content = "<h1>changed</h1>".to_string();
        assert_ne!(resolver().resolve(&changed)?.digest(), a.digest());
        Ok(())
    }

    #[test]
    fn storage_names_do_not_collide_on_concatenation() -> StackResult<()> {
        let a = resolver().resolve(&spec("ab", "c"))?;
        let b = resolver().resolve(&spec("a", "bc"))?;
        assert_ne!(a.storage_account.name, b.storage_account.name);
        Ok(())
    }

    #[test]
    fn storage_names_stay_within_limits() -> StackResult<()> {
        let long = "a".repeat(63);
        let plan = resolver().resolve(&spec(&long, &long))?;
        let name = plan.storage_account.name;
        assert!((3..=24).contains(&name.len()), "{name}");
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let dashed = resolver().resolve(&spec("my-co", "my-site"))?;
        assert!(!dashed.storage_account.name.contains('-'));
        Ok(())
    }

    #[test]
    fn reports_every_invalid_field() {
        let bad = SiteSpec {
            project: "Acme".to_string(),
            site: String::new(),
            ..SiteSpec::default()
        };
        let err = Resolver::default().resolve(&bad).err();
        let Some(StackError::InvalidSpec(fields)) = err else {
            panic!("expected InvalidSpec, got {err:?}");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field).collect();
        for expected in [
            "project",
            "site",
            "content",
            "content404",
            "location",
            "subscriptionId",
        ] {
            assert!(names.contains(&expected), "missing {expected} in {names:?}");
        }
    }

    #[test]
    fn rejects_malformed_subscription() {
        let mut s = spec("acme", "blog");
        s.subscription_id = Some("not-a-uuid".to_string());
        let err = resolver().resolve(&s).err();
        assert!(matches!(
            err,
            Some(StackError::InvalidSpec(ref f)) if f.len() == 1 && f[0].field == "subscriptionId"
        ));
    }

    #[test]
    fn rejects_bad_document_names() {
        let mut s = spec("acme", "blog");
        s.index_document = Some("pages/index.html".to_string());
        s.error_document = Some(String::new());
        let err = resolver().resolve(&s).err();
        let fields: Vec<_> = err
            .as_ref()
            .map(|e| e.fields().iter().map(|f| f.field).collect())
            .unwrap_or_default();
        assert_eq!(fields, vec!["indexDocument", "errorDocument"]);

        let mut same = spec("acme", "blog");
        same.error_document = Some("index.html".to_string());
        assert!(resolver().resolve(&same).is_err());
    }

    #[test]
    fn spec_fields_override_config() -> StackResult<()> {
        let mut s = spec("acme", "blog");
        s.location = Some("northeurope".to_string());
        s.index_document = Some("home.html".to_string());
        let plan = resolver().resolve(&s)?;
        assert_eq!(plan.location, "northeurope");
        assert_eq!(plan.blobs[0].name, "home.html");
        Ok(())
    }

    #[test]
    fn with_content_keeps_settings() {
        let mut s = spec("acme", "blog");
        s.location = Some("northeurope".to_string());
        let updated = s.with_content(SiteContent {
            content: "new".to_string(),
            content404: "gone".to_string(),
        });
        assert_eq!(updated.content, "new");
        assert_eq!(updated.content404, "gone");
        assert_eq!(updated.location.as_deref(), Some("northeurope"));
    }
}
