//! Ref: the copy-on-write indirection cell
//!
//! A `Ref` is committed (has a durable address), pending (holds a value that
//! has not been written yet), or both once a committed ref is hydrated or a
//! pending ref is committed. Clones share one slot, so identity
//! (`Ref::ptr_eq`) is what structural sharing is measured by.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ArborError, Result};
use crate::storage::{Addr, ADDR_NONE};

struct Slot<T> {
    address: Option<Addr>,
    value: Option<Arc<T>>,
}

/// Shared handle to a value that lives in memory, on disk, or both
pub struct Ref<T> {
    slot: Arc<RwLock<Slot<T>>>,
}

/// Requested change for one field of a node rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    /// Reuse the current field as-is
    Keep,
    /// Use a new value
    Replace(T),
}

impl<T: Clone> Change<T> {
    /// The new value, or a clone of `current` for `Keep`
    pub fn resolve(self, current: &T) -> T {
        match self {
            Change::Keep => current.clone(),
            Change::Replace(value) => value,
        }
    }
}

impl<T> Ref<T> {
    fn with_slot(address: Option<Addr>, value: Option<Arc<T>>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot { address, value })),
        }
    }

    /// New pending ref holding `value`
    pub fn pending(value: T) -> Self {
        Self::with_slot(None, Some(Arc::new(value)))
    }

    /// Committed, not yet hydrated ref. `ADDR_NONE` maps to `None`.
    pub fn from_addr(addr: Addr) -> Option<Self> {
        (addr != ADDR_NONE).then(|| Self::with_slot(Some(addr), None))
    }

    /// Durable address, if committed
    pub fn address(&self) -> Option<Addr> {
        self.slot.read().address
    }

    /// Durable address or `ADDR_NONE`
    pub fn addr(&self) -> Addr {
        self.address().unwrap_or(ADDR_NONE)
    }

    pub fn has_addr(&self) -> bool {
        self.slot.read().address.is_some()
    }

    pub fn has_value(&self) -> bool {
        self.slot.read().value.is_some()
    }

    /// True while the ref exists only in this process's memory
    pub fn is_pending(&self) -> bool {
        !self.has_addr()
    }

    /// Resident value
    ///
    /// Fails with `NotLoaded` when the ref was never hydrated; callers are
    /// expected to go through a `NodeManager` first.
    pub fn get(&self) -> Result<Arc<T>> {
        let slot = self.slot.read();
        slot.value.clone().ok_or_else(|| {
            ArborError::NotLoaded(format!(
                "ref at address {} has no resident value",
                slot.address.unwrap_or(ADDR_NONE)
            ))
        })
    }

    /// Install a hydrated value; a value already present wins
    pub(crate) fn fill(&self, value: Arc<T>) -> Arc<T> {
        let mut slot = self.slot.write();
        match &slot.value {
            Some(existing) => Arc::clone(existing),
            None => {
                slot.value = Some(Arc::clone(&value));
                value
            }
        }
    }

    /// Record the address assigned at commit
    pub(crate) fn set_addr(&self, addr: Addr) {
        let mut slot = self.slot.write();
        debug_assert!(slot.address.is_none(), "committed ref readdressed");
        slot.address = Some(addr);
    }

    /// `Keep` returns `current` itself; `Replace` builds a new pending ref
    pub fn transform(current: &Self, change: Change<T>) -> Self {
        match change {
            Change::Keep => current.clone(),
            Change::Replace(value) => Self::pending(value),
        }
    }

    /// Resident value if this handle is its last owner at both levels
    ///
    /// Returns `None` (and just drops the handle) when the slot or the value
    /// is still shared.
    pub(crate) fn into_unique(self) -> Option<T> {
        let slot = Arc::try_unwrap(self.slot).ok()?.into_inner();
        Arc::try_unwrap(slot.value?).ok()
    }

    /// Whether two handles are the same ref instance
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.slot, &b.slot)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("Ref")
            .field("address", &slot.address)
            .field("loaded", &slot.value.is_some())
            .finish()
    }
}
