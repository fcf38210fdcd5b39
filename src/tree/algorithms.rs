//! Functional tree algorithms
//!
//! Every operation takes the current root and returns a new one. Only nodes
//! on the search path are rebuilt; everything else is shared by ref with the
//! previous version.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{ArborError, Result};

use super::node::{load_node, Link, Node, NodeManager, NodeRef};
use super::reference::{Change, Ref};

/// Traversal order for `keys`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Node, left, right
    Pre,
    /// Left, node, right (sorted)
    #[default]
    In,
    /// Left, right, node
    Post,
}

fn compare(key: &[u8], node_key: &[u8]) -> Ordering {
    key.cmp(node_key)
}

/// Which child of a path node the search continued into
#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Nodes visited on the way down, root first, with the side taken at each
type Path = Vec<(Arc<Node>, Side)>;

/// Walk from `root` towards `key`
///
/// Returns the path above the stopping point and the node holding `key`, or
/// `None` when the walk fell off the tree.
fn descend<M: NodeManager + ?Sized>(
    manager: &mut M,
    root: Option<&NodeRef>,
    key: &[u8],
) -> Result<(Path, Option<Arc<Node>>)> {
    let mut path = Vec::new();
    let mut link = root.cloned();
    while let Some(node_ref) = link {
        let node = load_node(manager, &node_ref)?;
        let side = match compare(key, node.key()) {
            Ordering::Equal => return Ok((path, Some(node))),
            Ordering::Less => Side::Left,
            Ordering::Greater => Side::Right,
        };
        link = match side {
            Side::Left => node.left_ref().cloned(),
            Side::Right => node.right_ref().cloned(),
        };
        path.push((node, side));
    }
    Ok((path, None))
}

/// Copy of `parent` with the child on `side` swapped for `child`
fn attach(parent: &Node, side: Side, child: Link) -> Node {
    match side {
        Side::Left => parent.transform(Change::Keep, Change::Replace(child), Change::Keep),
        Side::Right => parent.transform(Change::Keep, Change::Keep, Change::Replace(child)),
    }
}

/// Locate the node holding `key`
pub fn find<M: NodeManager + ?Sized>(
    manager: &mut M,
    root: Option<&NodeRef>,
    key: &[u8],
) -> Result<Arc<Node>> {
    let mut link = root.cloned();
    while let Some(node_ref) = link {
        let node = load_node(manager, &node_ref)?;
        link = match compare(key, node.key()) {
            Ordering::Equal => return Ok(node),
            Ordering::Less => node.left_ref().cloned(),
            Ordering::Greater => node.right_ref().cloned(),
        };
    }
    Err(ArborError::KeyNotFound)
}

/// Insert or update `key`
///
/// Returns the new root ref. If nothing changed (same key, equal value) the
/// very same root ref comes back, so callers can detect a no-op with
/// `Ref::ptr_eq`.
pub fn insert<M: NodeManager + ?Sized>(
    manager: &mut M,
    root: Option<&NodeRef>,
    key: &Bytes,
    value: &Bytes,
) -> Result<NodeRef> {
    let (path, found) = descend(manager, root, key)?;

    let bottom = match found {
        Some(node) => {
            if *node.value(manager)? == *value {
                if let Some(current) = root {
                    return Ok(current.clone());
                }
            }
            node.transform(Change::Replace(value.clone()), Change::Keep, Change::Keep)
        }
        None => Node::leaf(key.clone(), value.clone()),
    };

    let mut new_ref = Ref::pending(bottom);
    for (parent, side) in path.into_iter().rev() {
        new_ref = Ref::pending(attach(&parent, side, Some(new_ref)));
    }
    Ok(new_ref)
}

/// Remove `key`, returning the new root (`None` when the tree empties)
pub fn remove<M: NodeManager + ?Sized>(
    manager: &mut M,
    root: Option<&NodeRef>,
    key: &[u8],
) -> Result<Link> {
    let (path, found) = descend(manager, root, key)?;
    let node = found.ok_or(ArborError::KeyNotFound)?;

    let mut link = unlink(manager, &node)?;
    for (parent, side) in path.into_iter().rev() {
        link = Some(Ref::pending(attach(&parent, side, link)));
    }
    Ok(link)
}

/// Replacement subtree for a node whose key is being removed
fn unlink<M: NodeManager + ?Sized>(manager: &mut M, node: &Node) -> Result<Link> {
    match (node.left_ref(), node.right_ref()) {
        (None, None) => Ok(None),
        (Some(child), None) | (None, Some(child)) => Ok(Some(child.clone())),
        (Some(left), Some(right)) => {
            // Predecessor: the largest key of the left subtree.
            let predecessor = find_max(manager, left)?;
            let new_left = remove(manager, Some(left), predecessor.key())?;
            Ok(Some(Ref::pending(Node::new(
                predecessor.key().clone(),
                predecessor.value_ref().clone(),
                new_left,
                Some(right.clone()),
            ))))
        }
    }
}

/// Rightmost node under `node_ref`
pub fn find_max<M: NodeManager + ?Sized>(manager: &mut M, node_ref: &NodeRef) -> Result<Arc<Node>> {
    let mut node = load_node(manager, node_ref)?;
    while let Some(right) = node.right_ref().cloned() {
        node = load_node(manager, &right)?;
    }
    Ok(node)
}

/// All keys under `root` in the requested order
pub fn keys<M: NodeManager + ?Sized>(
    manager: &mut M,
    root: Option<&NodeRef>,
    order: Order,
) -> Result<Vec<Bytes>> {
    let mut out = Vec::new();
    let Some(root) = root else {
        return Ok(out);
    };

    match order {
        Order::Pre | Order::Post => {
            // Post-order is the reverse of a node, right, left walk.
            let mut stack = vec![root.clone()];
            while let Some(node_ref) = stack.pop() {
                let node = load_node(manager, &node_ref)?;
                out.push(node.key().clone());
                let (first, second) = match order {
                    Order::Pre => (node.right_ref(), node.left_ref()),
                    _ => (node.left_ref(), node.right_ref()),
                };
                stack.extend(first.cloned());
                stack.extend(second.cloned());
            }
            if order == Order::Post {
                out.reverse();
            }
        }
        Order::In => {
            let mut stack: Vec<Arc<Node>> = Vec::new();
            let mut link = Some(root.clone());
            loop {
                while let Some(node_ref) = link {
                    let node = load_node(manager, &node_ref)?;
                    link = node.left_ref().cloned();
                    stack.push(node);
                }
                let Some(node) = stack.pop() else {
                    break;
                };
                out.push(node.key().clone());
                link = node.right_ref().cloned();
            }
        }
    }
    Ok(out)
}
