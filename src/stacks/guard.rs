//! Per-stack mutual exclusion.
//!
//! A [`Lease`] grants exclusive access to one [`StackHandle`]. Leases are
//! released exactly once, either explicitly or on drop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::error::{StackError, StackResult};
use super::types::StackHandle;

#[derive(Debug, Default)]
struct LeaseTable {
    slots: HashMap<StackHandle, Arc<AsyncMutex<()>>>,
    held: HashSet<StackHandle>,
}

type Slots = Arc<Mutex<LeaseTable>>;

/// How `acquire` behaves when the handle is already leased.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcquirePolicy {
    /// Return `Conflict` immediately.
    #[default]
    FailFast,
    /// Wait in FIFO order up to the given duration, then return `Conflict`.
    Wait(Duration),
}

impl AcquirePolicy {
    /// `Wait` for a positive duration, `FailFast` for zero.
    #[must_use]
    pub const fn from_wait(wait: Duration) -> Self {
        if wait.is_zero() {
            Self::FailFast
        } else {
            Self::Wait(wait)
        }
    }
}

/// Grants at most one lease per handle.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGuard {
    slots: Slots,
    policy: AcquirePolicy,
}

impl ConcurrencyGuard {
    #[must_use]
    pub fn new(policy: AcquirePolicy) -> Self {
        Self {
            slots: Slots::default(),
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> AcquirePolicy {
        self.policy
    }

    fn slot(&self, handle: &StackHandle) -> StackResult<Arc<AsyncMutex<()>>> {
        let mut table = self
            .slots
            .lock()
            .map_err(|_| StackError::storage("lease table poisoned"))?;

        Ok(table
            .slots
            .entry(handle.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }

    /// Acquire the lease for `handle`.
    ///
    /// # Errors
    /// Returns [`StackError::Conflict`] when the handle stays held past the
    /// configured policy.
    pub async fn acquire(&self, handle: &StackHandle) -> StackResult<Lease> {
        let slot = self.slot(handle)?;

        let guard = match self.policy {
            AcquirePolicy::FailFast => slot.try_lock_owned().ok(),
            AcquirePolicy::Wait(limit) => {
                tokio::time::timeout(limit, slot.lock_owned()).await.ok()
            }
        };

        let Some(guard) = guard else {
            // The failed attempt no longer references the slot.
            if let Ok(mut table) = self.slots.lock() {
                reclaim(&mut table, handle);
            }
            debug!(stack = %handle, "lease held");
            return Err(StackError::conflict(handle));
        };

        self.slots
            .lock()
            .map_err(|_| StackError::storage("lease table poisoned"))?
            .held
            .insert(handle.clone());

        debug!(stack = %handle, "lease acquired");

        Ok(Lease {
            handle: handle.clone(),
            guard: Some(guard),
            slots: self.slots.clone(),
        })
    }

    /// Whether a lease is currently granted for `handle`.
    #[must_use]
    pub fn is_held(&self, handle: &StackHandle) -> bool {
        self.slots
            .lock()
            .is_ok_and(|table| table.held.contains(handle))
    }

    /// Number of handles with a granted lease.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.slots.lock().map_or(0, |table| table.held.len())
    }

    /// Number of handles with a slot in the table. Used to check reclamation.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.lock().map_or(0, |table| table.slots.len())
    }
}

/// Drop the slot for `handle` when nothing else references it.
fn reclaim(table: &mut LeaseTable, handle: &StackHandle) {
    // The table holds one reference; any other belongs to a lease or a waiter.
    if table
        .slots
        .get(handle)
        .is_some_and(|slot| Arc::strong_count(slot) == 1)
    {
        table.slots.remove(handle);
    }
}

/// Exclusive access to one stack.
#[derive(Debug)]
pub struct Lease {
    handle: StackHandle,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Slots,
}

impl Lease {
    #[must_use]
    pub const fn handle(&self) -> &StackHandle {
        &self.handle
    }

    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.guard.is_none()
    }

    /// Release the lease. Calling this more than once has no effect.
    pub fn release(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };

        match self.slots.lock() {
            Ok(mut table) => {
                // Unlock while the table is locked so a new holder cannot be
                // recorded before this one is cleared.
                table.held.remove(&self.handle);
                drop(guard);
                reclaim(&mut table, &self.handle);
            }
            Err(_) => {
                drop(guard);
                warn!(stack = %self.handle, "lease table poisoned, slot not reclaimed");
            }
        }

        debug!(stack = %self.handle, "lease released");
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}
