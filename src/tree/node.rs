//! Immutable tree node and the hydration seam
//!
//! Nodes never change after construction. Reading a child or value that is
//! not yet in memory goes through a `NodeManager`, which the caller passes
//! in; nodes hold no pointer back to the tree or the storage.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{ArborError, Result};

use super::record::NodeRecord;
use super::reference::{Change, Ref};

/// Ref to a stored value
pub type ValueRef = Ref<Bytes>;

/// Ref to a child node
pub type NodeRef = Ref<Node>;

/// Optional child: `None` means no subtree
pub type Link = Option<NodeRef>;

/// Hydrates refs that are committed but not resident
///
/// Implementations must leave already-resident refs alone.
pub trait NodeManager {
    fn on_load_value(&mut self, value_ref: &ValueRef) -> Result<()>;
    fn on_load_node(&mut self, node_ref: &NodeRef) -> Result<()>;
}

/// Manager for purely in-memory trees: never loads anything
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl NodeManager for Detached {
    fn on_load_value(&mut self, _value_ref: &ValueRef) -> Result<()> {
        Ok(())
    }

    fn on_load_node(&mut self, _node_ref: &NodeRef) -> Result<()> {
        Ok(())
    }
}

/// Binary search tree node
#[derive(Debug)]
pub struct Node {
    key: Bytes,
    value_ref: ValueRef,
    left_ref: Link,
    right_ref: Link,
}

impl Node {
    pub fn new(key: Bytes, value_ref: ValueRef, left_ref: Link, right_ref: Link) -> Self {
        Self {
            key,
            value_ref,
            left_ref,
            right_ref,
        }
    }

    /// New childless node with a pending value
    pub fn leaf(key: Bytes, value: Bytes) -> Self {
        Self::new(key, Ref::pending(value), None, None)
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value_ref(&self) -> &ValueRef {
        &self.value_ref
    }

    pub fn left_ref(&self) -> Option<&NodeRef> {
        self.left_ref.as_ref()
    }

    pub fn right_ref(&self) -> Option<&NodeRef> {
        self.right_ref.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.left_ref.is_none() && self.right_ref.is_none()
    }

    /// Value, hydrated through `manager` if needed
    pub fn value<M: NodeManager + ?Sized>(&self, manager: &mut M) -> Result<Arc<Bytes>> {
        manager.on_load_value(&self.value_ref)?;
        self.value_ref.get()
    }

    pub fn left<M: NodeManager + ?Sized>(&self, manager: &mut M) -> Result<Option<Arc<Node>>> {
        self.left_ref().map(|r| load_node(manager, r)).transpose()
    }

    pub fn right<M: NodeManager + ?Sized>(&self, manager: &mut M) -> Result<Option<Arc<Node>>> {
        self.right_ref().map(|r| load_node(manager, r)).transpose()
    }

    /// Build a new node with the same key
    ///
    /// `Keep` fields reuse the existing ref instances.
    pub fn transform(&self, value: Change<Bytes>, left: Change<Link>, right: Change<Link>) -> Node {
        Node {
            key: self.key.clone(),
            value_ref: Ref::transform(&self.value_ref, value),
            left_ref: left.resolve(&self.left_ref),
            right_ref: right.resolve(&self.right_ref),
        }
    }

    /// Node with unhydrated refs from a decoded record
    pub(crate) fn from_record(record: NodeRecord) -> Result<Node> {
        let value_ref = Ref::from_addr(record.value_addr).ok_or_else(|| {
            ArborError::CorruptStore("node record without a value address".to_string())
        })?;
        Ok(Node::new(
            record.key,
            value_ref,
            Ref::from_addr(record.left_addr),
            Ref::from_addr(record.right_addr),
        ))
    }
}

impl Drop for Node {
    // Iterative: an unbalanced tree can be as deep as it has keys.
    fn drop(&mut self) {
        let mut pending: Vec<NodeRef> = Vec::new();
        pending.extend(self.left_ref.take());
        pending.extend(self.right_ref.take());

        while let Some(child) = pending.pop() {
            if let Some(mut node) = child.into_unique() {
                pending.extend(node.left_ref.take());
                pending.extend(node.right_ref.take());
            }
        }
    }
}

/// Hydrate `node_ref` through `manager` and return the node
pub fn load_node<M: NodeManager + ?Sized>(manager: &mut M, node_ref: &NodeRef) -> Result<Arc<Node>> {
    manager.on_load_node(node_ref)?;
    node_ref.get()
}
