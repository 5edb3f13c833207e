//! Stack record storage backends.
//!
//! The registry persists one [`StackRecord`] per live stack plus the set of
//! known projects. [`PostgresStore`] is used in production, [`MemoryStore`]
//! when no database is configured and in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use super::error::StackResult;
use super::types::{ProjectName, StackHandle, StackRecord};

/// Backend for stack records.
///
/// Callers serialize writes per handle, so implementations only need
/// per-call atomicity.
#[async_trait]
pub trait StackStore: Send + Sync {
    /// Short identifier reported by the health endpoint.
    fn backend(&self) -> &'static str;

    /// Get the record for a handle, `None` when the stack is absent.
    async fn get(&self, handle: &StackHandle) -> StackResult<Option<StackRecord>>;

    /// Insert or replace a record. An `Active` record registers its project.
    async fn put(&self, record: &StackRecord) -> StackResult<()>;

    /// Delete a record. Returns whether one existed. The project stays known.
    async fn delete(&self, handle: &StackHandle) -> StackResult<bool>;

    /// All records of a project, in no particular order.
    async fn list_by_project(&self, project: &ProjectName) -> StackResult<Vec<StackRecord>>;

    /// Whether a stack under the project ever became active.
    async fn project_exists(&self, project: &ProjectName) -> StackResult<bool>;
}
