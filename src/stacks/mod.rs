//! Static site stack lifecycle.
//!
//! A stack is identified by a `(project, site)` pair. The [`SiteService`]
//! validates input and resolves plans, the [`LifecycleController`] serializes
//! operations per stack and drives a [`provider::Provider`], and the
//! [`StackRegistry`] keeps track of what exists.

pub mod controller;
pub mod error;
pub mod guard;
pub mod journal;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod sites;
pub mod store;
pub mod types;

pub use self::controller::{ControllerConfig, Deployment, LifecycleController};
pub use self::error::{ErrorKind, FieldError, StackError, StackResult};
pub use self::guard::{AcquirePolicy, ConcurrencyGuard, Lease};
pub use self::journal::{LifecycleOperation, OperationKind, OperationOutcome};
pub use self::registry::StackRegistry;
pub use self::resolver::{ResolverConfig, ResourcePlan, Resolver, SiteContent, SiteSpec};
pub use self::sites::SiteService;
pub use self::types::{
    ChangeSummary, Outputs, ProjectName, Site, SiteName, SiteStatus, StackHandle, StackRecord,
};
