//! Tree Module
//!
//! Persistent (copy-on-write) binary search tree over lazily loaded refs.
//!
//! ## Responsibilities
//! - `Ref`: indirection cell, pending (in memory) or committed (on disk)
//! - `Node`: immutable key/value node with optional children
//! - Functional find/insert/remove that share untouched subtrees
//! - `BinaryTree`: root ownership, hydration from storage, commit
//!
//! ## Versions Share Structure
//! ```text
//!   before set(k5)            after set(k5)
//!
//!        k4                        k4'
//!       /  \                      /  \
//!     k2    k6        ==>       k2    k6'
//!             \                      /  \
//!              k7                  k5    k7
//!
//!   k2 and k7 are the same refs in both versions; k4', k6' and k5 are new.
//! ```

mod algorithms;
mod manager;
mod node;
mod record;
mod reference;

pub use algorithms::{find, find_max, insert, keys, remove, Order};
pub use manager::BinaryTree;
pub use node::{load_node, Detached, Link, Node, NodeManager, NodeRef, ValueRef};
pub use record::{decode_value, encode_value, NodeRecord, RECORD_VERSION};
pub use reference::{Change, Ref};
