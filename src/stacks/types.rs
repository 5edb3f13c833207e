//! Core types for stack lifecycle management.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use super::resolver::SiteSpec;

const NAME_MAX: usize = 63;

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").ok())
        .as_ref()
}

/// Validates a project or site name.
///
/// Names end up in cloud resource names, so only lowercase `a-z0-9-` is
/// accepted, without leading or trailing dashes.
fn validate_name(input: &str) -> Result<(), String> {
    if input.is_empty() {
        return Err("is required".to_string());
    }
    if input.len() > NAME_MAX {
        return Err(format!("must be at most {NAME_MAX} characters"));
    }
    match name_pattern() {
        Some(re) if re.is_match(input) => Ok(()),
        _ => Err(
            "must contain only lowercase letters, digits and '-', and not start or end with '-'"
                .to_string(),
        ),
    }
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate a name.
            ///
            /// # Errors
            /// Returns a human-readable reason when the name is not resource-name safe.
            pub fn parse(input: &str) -> Result<Self, String> {
                validate_name(input)?;
                Ok(Self(input.to_string()))
            }

            /// Wrap a value that was validated before it was persisted.
            pub(crate) fn new_unchecked(input: impl Into<String>) -> Self {
                Self(input.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate_name(&value)?;
                Ok(Self(value))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

name_type!(
    /// Logical namespace grouping sites.
    ProjectName
);

name_type!(
    /// Deployable unit name, unique within a project.
    SiteName
);

/// Identity and concurrency unit: one per (project, site) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackHandle {
    project: ProjectName,
    site: SiteName,
}

impl StackHandle {
    #[must_use]
    pub const fn new(project: ProjectName, site: SiteName) -> Self {
        Self { project, site }
    }

    #[must_use]
    pub const fn project(&self) -> &ProjectName {
        &self.project
    }

    #[must_use]
    pub const fn site(&self) -> &SiteName {
        &self.site
    }
}

impl fmt::Display for StackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.site)
    }
}

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    /// No record exists. Never persisted.
    Absent,
    Provisioning,
    Active,
    Updating,
    Destroying,
}

impl SiteStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Updating => "updating",
            Self::Destroying => "destroying",
        }
    }

    /// Whether an operation is mid-flight for this status.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Provisioning | Self::Updating | Self::Destroying)
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absent" => Ok(Self::Absent),
            "provisioning" => Ok(Self::Provisioning),
            "active" => Ok(Self::Active),
            "updating" => Ok(Self::Updating),
            "destroying" => Ok(Self::Destroying),
            _ => Err(format!("unknown site status: {s}")),
        }
    }
}

/// Values produced by a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Outputs {
    /// Public endpoint of the static website.
    #[serde(rename = "staticEndpoint")]
    #[schema(value_type = String, format = Uri)]
    pub endpoint: Url,
}

impl Outputs {
    #[must_use]
    pub const fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }
}

/// Resource change counts reported by an apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeSummary {
    pub create: u32,
    pub update: u32,
    pub delete: u32,
    pub same: u32,
}

impl ChangeSummary {
    /// True when the apply did not touch any resource.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.create == 0 && self.update == 0 && self.delete == 0
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "create: {}, update: {}, delete: {}, same: {}",
            self.create, self.update, self.delete, self.same
        )
    }
}

/// Persisted bookkeeping behind a stack handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRecord {
    pub handle: StackHandle,
    pub status: SiteStatus,
    /// Spec of the last accepted plan, with resolver defaults filled in.
    pub spec: SiteSpec,
    /// Outputs of the latest successful apply.
    pub outputs: Option<Outputs>,
    pub plan_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StackRecord {
    /// Create a record for a stack entering `status`.
    #[must_use]
    pub fn new(handle: StackHandle, status: SiteStatus, spec: SiteSpec) -> Self {
        let now = Utc::now();
        Self {
            handle,
            status,
            spec,
            outputs: None,
            plan_digest: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Externally visible view of a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub project: ProjectName,
    pub name: SiteName,
    pub status: SiteStatus,
    #[schema(value_type = Option<String>, format = Uri)]
    pub endpoint: Option<Url>,
    pub location: Option<String>,
    pub subscription_id: Option<String>,
    pub index_document: Option<String>,
    pub error_document: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&StackRecord> for Site {
    fn from(record: &StackRecord) -> Self {
        Self {
            project: record.handle.project().clone(),
            name: record.handle.site().clone(),
            status: record.status,
            endpoint: record.outputs.as_ref().map(|o| o.endpoint.clone()),
            location: record.spec.location.clone(),
            subscription_id: record.spec.subscription_id.clone(),
            index_document: record.spec.index_document.clone(),
            error_document: record.spec.error_document.clone(),
            updated_at: record.updated_at,
        }
    }
}
