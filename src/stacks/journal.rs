//! Bounded in-memory history of lifecycle operations.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;
use ulid::Ulid;
use utoipa::ToSchema;

use super::error::{StackError, StackResult};
use super::types::{Outputs, ProjectName, SiteName, StackHandle, StackRecord};

pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Destroy,
    Refresh,
    Adopt,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Destroy => "destroy",
            Self::Refresh => "refresh",
            Self::Adopt => "adopt",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        outputs: Option<Outputs>,
    },
    Conflict,
    NotFound,
    AlreadyExists,
    InvalidSpec,
    Failed {
        reason: String,
    },
}

impl OperationOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<&StackError> for OperationOutcome {
    fn from(err: &StackError) -> Self {
        match err {
            StackError::Conflict { .. } => Self::Conflict,
            StackError::NotFound { .. } | StackError::ProjectNotFound { .. } => Self::NotFound,
            StackError::AlreadyExists { .. } => Self::AlreadyExists,
            StackError::InvalidSpec(_) => Self::InvalidSpec,
            StackError::Provider(_) => Self::Failed {
                reason: err.to_string(),
            },
            // backend detail stays in the log
            StackError::Storage(_) => Self::Failed {
                reason: "internal error".to_string(),
            },
        }
    }
}

/// Values an operation can report outputs from.
pub trait OperationResult {
    fn outputs(&self) -> Option<&Outputs>;
}

impl OperationResult for () {
    fn outputs(&self) -> Option<&Outputs> {
        None
    }
}

impl OperationResult for StackRecord {
    fn outputs(&self) -> Option<&Outputs> {
        self.outputs.as_ref()
    }
}

impl<T: OperationResult> OperationResult for StackResult<T> {
    fn outputs(&self) -> Option<&Outputs> {
        self.as_ref().ok().and_then(OperationResult::outputs)
    }
}

/// One finished lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleOperation {
    /// ULID, sortable by start time.
    pub id: String,
    pub kind: OperationKind,
    pub project: ProjectName,
    pub site: SiteName,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: OperationOutcome,
}

#[derive(Debug, Clone)]
pub struct Journal {
    entries: Arc<Mutex<VecDeque<LifecycleOperation>>>,
    capacity: usize,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl Journal {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    /// Append a finished operation, evicting the oldest entry when full.
    pub fn record<T: OperationResult>(
        &self,
        kind: OperationKind,
        handle: &StackHandle,
        started_at: DateTime<Utc>,
        result: &StackResult<T>,
    ) -> Option<LifecycleOperation> {
        let outcome = match result {
            Ok(_) => OperationOutcome::Success {
                outputs: result.outputs().cloned(),
            },
            Err(err) => {
                if let StackError::Storage(detail) = err {
                    error!(operation = %kind, stack = %handle, "storage failure: {detail}");
                }
                OperationOutcome::from(err)
            }
        };

        let entry = LifecycleOperation {
            id: Ulid::new().to_string(),
            kind,
            project: handle.project().clone(),
            site: handle.site().clone(),
            started_at,
            finished_at: Utc::now(),
            outcome,
        };

        let mut entries = self.entries.lock().ok()?;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Some(entry)
    }

    /// Operations for one stack, oldest first.
    #[must_use]
    pub fn for_handle(&self, handle: &StackHandle) -> Vec<LifecycleOperation> {
        self.entries.lock().map_or_else(
            |_| Vec::new(),
            |entries| {
                entries
                    .iter()
                    .filter(|op| op.project == *handle.project() && op.site == *handle.site())
                    .cloned()
                    .collect()
            },
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(site: &str) -> StackHandle {
        StackHandle::new(
            ProjectName::new_unchecked("acme"),
            SiteName::new_unchecked(site),
        )
    }

    #[test]
    fn records_outcomes_per_handle() {
        let journal = Journal::default();
        let blog = handle("blog");

        journal.record(OperationKind::Create, &blog, Utc::now(), &Ok::<(), _>(()));
        journal.record(
            OperationKind::Update,
            &blog,
            Utc::now(),
            &Err::<(), _>(StackError::conflict(&blog)),
        );
        journal.record(OperationKind::Create, &handle("docs"), Utc::now(), &Ok::<(), _>(()));

        let ops = journal.for_handle(&blog);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OperationKind::Create);
        assert!(ops[0].outcome.is_success());
        assert_eq!(ops[1].outcome, OperationOutcome::Conflict);
        assert!(ops[0].finished_at >= ops[0].started_at);
    }

    #[test]
    fn evicts_oldest_entries() {
        let journal = Journal::new(3);
        let blog = handle("blog");
        for _ in 0..5 {
            journal.record(OperationKind::Read, &blog, Utc::now(), &Ok::<(), _>(()));
        }
        assert_eq!(journal.len(), 3);
    }

    #[test]
    fn outcome_serializes_with_tag() -> Result<(), serde_json::Error> {
        let failed = OperationOutcome::Failed {
            reason: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&failed)?,
            serde_json::json!({"result": "failed", "reason": "boom"})
        );
        assert_eq!(
            serde_json::to_value(OperationOutcome::NotFound)?,
            serde_json::json!({"result": "not_found"})
        );
        Ok(())
    }

    #[test]
    fn storage_detail_is_not_recorded() -> Result<(), serde_json::Error> {
        let journal = Journal::default();
        let blog = handle("blog");
        journal.record(
            OperationKind::Read,
            &blog,
            Utc::now(),
            &Err::<(), _>(StackError::storage(
                "password authentication failed for user \"admin\" at db.internal:5432",
            )),
        );

        let ops = journal.for_handle(&blog);
        assert_eq!(
            ops.first().map(|op| op.outcome.clone()),
            Some(OperationOutcome::Failed {
                reason: "internal error".to_string()
            })
        );
        let body = serde_json::to_string(&ops)?;
        assert!(!body.contains("password"));
        assert!(!body.contains("db.internal"));
        Ok(())
    }
}
