//! Tree manager
//!
//! Owns the root ref, hydrates refs from storage and commits pending refs
//! back to it.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{ArborError, Result};
use crate::storage::{Addr, Storage, ADDR_NONE};

use super::algorithms::{self, Order};
use super::node::{Link, Node, NodeManager, NodeRef, ValueRef};
use super::record::{self, NodeRecord};
use super::reference::Ref;

// =============================================================================
// Hydration
// =============================================================================

impl NodeManager for Storage {
    fn on_load_value(&mut self, value_ref: &ValueRef) -> Result<()> {
        if value_ref.has_value() {
            return Ok(());
        }
        let addr = value_ref.address().ok_or_else(|| {
            ArborError::NotLoaded("value ref has neither address nor value".to_string())
        })?;
        let value = record::decode_value(self.read_data(addr)?)?;
        value_ref.fill(Arc::new(value));
        trace!(addr, "value hydrated");
        Ok(())
    }

    fn on_load_node(&mut self, node_ref: &NodeRef) -> Result<()> {
        if node_ref.has_value() {
            return Ok(());
        }
        let addr = node_ref.address().ok_or_else(|| {
            ArborError::NotLoaded("node ref has neither address nor value".to_string())
        })?;
        let node = Node::from_record(NodeRecord::decode(self.read_data(addr)?)?)?;
        node_ref.fill(Arc::new(node));
        trace!(addr, "node hydrated");
        Ok(())
    }
}

// =============================================================================
// Binary Tree
// =============================================================================

/// Persistent binary search tree rooted in a single ref
///
/// ## States:
/// - **Clean**: root is `None` or committed; matches some published header
/// - **Dirty**: root is pending; mutations made since the last commit
///
/// The tree never holds a storage handle; every method that may touch disk
/// takes one (or any `NodeManager`) as a parameter.
#[derive(Debug, Default)]
pub struct BinaryTree {
    root: Link,
}

impl BinaryTree {
    /// Empty in-memory tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree rooted at `root`
    pub fn with_root(root: Link) -> Self {
        Self { root }
    }

    /// Tree rooted at the currently published root of `storage`
    pub fn open(storage: &mut Storage) -> Result<Self> {
        let mut tree = Self::new();
        storage.with_lock(|s| tree.reload_root(s))?;
        Ok(tree)
    }

    pub fn root(&self) -> Option<&NodeRef> {
        self.root.as_ref()
    }

    /// Address of the root, `ADDR_NONE` if empty or pending
    pub fn root_addr(&self) -> Addr {
        self.root.as_ref().map_or(ADDR_NONE, Ref::addr)
    }

    /// True when the root has not been committed
    pub fn is_dirty(&self) -> bool {
        self.root.as_ref().is_some_and(Ref::is_pending)
    }

    /// Swap the root back to an earlier version (transaction rollback)
    pub fn restore_root(&mut self, root: Link) {
        self.root = root;
    }

    /// Follow the root published in the storage header
    ///
    /// Replaces the in-memory root with an unhydrated ref when the header
    /// points elsewhere. Uncommitted changes are discarded.
    pub fn reload_root(&mut self, storage: &mut Storage) -> Result<()> {
        storage.reload()?;
        let disk_root = storage.root_addr();
        if self.is_dirty() || self.root_addr() != disk_root {
            debug!(from = self.root_addr(), to = disk_root, "root reloaded");
            self.root = Ref::from_addr(disk_root);
        }
        Ok(())
    }

    // =========================================================================
    // Key Operations
    // =========================================================================

    pub fn get<M: NodeManager + ?Sized>(&self, manager: &mut M, key: &[u8]) -> Result<Arc<Bytes>> {
        let node = algorithms::find(manager, self.root(), key)?;
        node.value(manager)
    }

    pub fn contains_key<M: NodeManager + ?Sized>(&self, manager: &mut M, key: &[u8]) -> Result<bool> {
        match algorithms::find(manager, self.root(), key) {
            Ok(_) => Ok(true),
            Err(ArborError::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn set<M: NodeManager + ?Sized>(&mut self, manager: &mut M, key: &Bytes, value: &Bytes) -> Result<()> {
        let root = algorithms::insert(manager, self.root(), key, value)?;
        if !self.root().is_some_and(|current| Ref::ptr_eq(current, &root)) {
            self.root = Some(root);
        }
        Ok(())
    }

    pub fn delete<M: NodeManager + ?Sized>(&mut self, manager: &mut M, key: &[u8]) -> Result<()> {
        self.root = algorithms::remove(manager, self.root(), key)?;
        Ok(())
    }

    pub fn keys<M: NodeManager + ?Sized>(&self, manager: &mut M, order: Order) -> Result<Vec<Bytes>> {
        algorithms::keys(manager, self.root(), order)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Write every pending ref and publish the root
    ///
    /// Values are written before their node and children before their
    /// parent, so no record ever points forward. Records are synced before
    /// the header is written, and the header is synced after. Returns
    /// `false` when the published root was already current, in which case
    /// nothing is written at all.
    pub fn commit(&mut self, storage: &mut Storage) -> Result<bool> {
        let free_before = storage.free_addr();
        let root_addr = match &self.root {
            Some(root) => commit_node_ref(storage, root)?,
            None => ADDR_NONE,
        };
        if root_addr == storage.root_addr() {
            return Ok(false);
        }

        if storage.free_addr() != free_before {
            storage.sync_on_commit()?;
        }
        storage.set_root_addr(root_addr)?;
        storage.sync_on_commit()?;
        debug!(root_addr, free_addr = storage.free_addr(), "tree committed");
        Ok(true)
    }
}

/// Post-order commit with an explicit stack
///
/// A node is visited twice: first to write its value and schedule its
/// pending children, then (once they have addresses) to write itself.
fn commit_node_ref(storage: &mut Storage, root: &NodeRef) -> Result<Addr> {
    if let Some(addr) = root.address() {
        return Ok(addr);
    }

    let mut stack: Vec<(NodeRef, bool)> = vec![(root.clone(), false)];
    while let Some((node_ref, children_done)) = stack.pop() {
        let node = node_ref.get()?;

        if !children_done {
            commit_value_ref(storage, node.value_ref())?;
            stack.push((node_ref.clone(), true));
            for child in [node.right_ref(), node.left_ref()].into_iter().flatten() {
                if child.is_pending() {
                    stack.push((child.clone(), false));
                }
            }
            continue;
        }

        let record = NodeRecord {
            key: node.key().clone(),
            value_addr: node.value_ref().addr(),
            left_addr: node.left_ref().map_or(ADDR_NONE, Ref::addr),
            right_addr: node.right_ref().map_or(ADDR_NONE, Ref::addr),
        };
        let addr = storage.write_data(&record.encode())?;
        node_ref.set_addr(addr);
    }

    Ok(root.addr())
}

fn commit_value_ref(storage: &mut Storage, value_ref: &ValueRef) -> Result<Addr> {
    if let Some(addr) = value_ref.address() {
        return Ok(addr);
    }
    let value = value_ref.get()?;
    let addr = storage.write_data(&record::encode_value(&value))?;
    value_ref.set_addr(addr);
    Ok(addr)
}
