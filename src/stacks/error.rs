//! Error taxonomy for stack lifecycle operations.
//!
//! Every operation surfaces exactly one [`ErrorKind`]. Engine failures are
//! classified from [`ProviderError`] and never swallowed.

use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use super::provider::ProviderError;
use super::types::{ProjectName, SiteName, StackHandle};

/// Result type alias using [`StackError`].
pub type StackResult<T> = Result<T, StackError>;

/// A single rejected field in a site specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    /// Field name as it appears in the request payload.
    #[schema(value_type = String)]
    pub field: &'static str,
    /// Why the field was rejected.
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur while managing stacks.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Client input was rejected. Lists every offending field.
    #[error("invalid site specification: {}", join_fields(.0))]
    InvalidSpec(Vec<FieldError>),

    /// Project was never provisioned.
    #[error("Project {project} does not exist!")]
    ProjectNotFound { project: ProjectName },

    /// The referenced stack does not exist.
    #[error("Stack {site} does not exist in project {project}!")]
    NotFound {
        project: ProjectName,
        site: SiteName,
    },

    /// Create on a stack that already exists.
    #[error("Stack {site} already exists in project {project}!")]
    AlreadyExists {
        project: ProjectName,
        site: SiteName,
    },

    /// Another operation holds the stack.
    #[error("Stack {site} already has an operation in progress!")]
    Conflict {
        project: ProjectName,
        site: SiteName,
    },

    /// Opaque engine failure, surfaced verbatim.
    #[error("{0}")]
    Provider(String),

    /// Registry backend failure.
    #[error("storage error: {0}")]
    Storage(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse classification used by the HTTP and CLI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSpec,
    NotFound,
    AlreadyExists,
    Conflict,
    ProviderError,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSpec => "invalid_spec",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::ProviderError => "provider_error",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StackError {
    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    #[must_use]
    pub fn not_found(handle: &StackHandle) -> Self {
        Self::NotFound {
            project: handle.project().clone(),
            site: handle.site().clone(),
        }
    }

    #[must_use]
    pub fn already_exists(handle: &StackHandle) -> Self {
        Self::AlreadyExists {
            project: handle.project().clone(),
            site: handle.site().clone(),
        }
    }

    #[must_use]
    pub fn conflict(handle: &StackHandle) -> Self {
        Self::Conflict {
            project: handle.project().clone(),
            site: handle.site().clone(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSpec(_) => ErrorKind::InvalidSpec,
            Self::ProjectNotFound { .. } | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Classify an engine error for the stack it was raised against.
    ///
    /// Concurrent-operation reports map to `Conflict` for every operation kind.
    #[must_use]
    pub fn from_provider(handle: &StackHandle, err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound => Self::not_found(handle),
            ProviderError::AlreadyExists => Self::already_exists(handle),
            ProviderError::ConcurrentOperation => Self::conflict(handle),
            ProviderError::Failed(detail) => Self::Provider(detail),
        }
    }

    /// Field errors carried by an `InvalidSpec`, empty otherwise.
    #[must_use]
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::InvalidSpec(fields) => fields,
            _ => &[],
        }
    }
}

impl From<sqlx::Error> for StackError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
