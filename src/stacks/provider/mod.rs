//! Infrastructure engine adapters.
//!
//! A [`Provider`] turns a [`ResourcePlan`] into real resources and reports
//! typed [`Outputs`]. The controller never talks to an engine directly.

mod memory;
mod pulumi;

pub use memory::MemoryProvider;
pub use pulumi::{PulumiConfig, PulumiProvider, DEFAULT_AZURE_NATIVE_VERSION};

use async_trait::async_trait;

use super::resolver::ResourcePlan;
use super::types::{ChangeSummary, Outputs, StackHandle};

/// Errors reported by an engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("stack does not exist")]
    NotFound,

    #[error("stack already exists")]
    AlreadyExists,

    /// The engine refused because another update holds the stack.
    #[error("another operation is in progress on this stack")]
    ConcurrentOperation,

    #[error("{0}")]
    Failed(String),
}

impl ProviderError {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub outputs: Outputs,
    pub changes: ChangeSummary,
}

/// Engine seam used by the lifecycle controller.
///
/// Implementations must be idempotent for an identical plan: applying the
/// same plan twice converges on the same resources.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier reported by the health endpoint.
    fn name(&self) -> &'static str;

    /// Create or update every resource in the plan.
    async fn apply(&self, plan: &ResourcePlan) -> Result<Applied, ProviderError>;

    /// Tear down every resource owned by the stack.
    ///
    /// Destroying a stack with no resources either succeeds or returns
    /// [`ProviderError::NotFound`].
    async fn destroy(&self, handle: &StackHandle) -> Result<(), ProviderError>;

    /// Outputs of the last successful apply, as known to the engine.
    async fn outputs(&self, handle: &StackHandle) -> Result<Outputs, ProviderError>;

    /// Re-read remote state and return the resulting outputs.
    async fn refresh(&self, handle: &StackHandle) -> Result<Outputs, ProviderError>;
}
