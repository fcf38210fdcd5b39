//! # ArborDB
//!
//! A single-file key-value store with:
//! - A persistent (copy-on-write) binary search tree
//! - Lazy loading of nodes and values from disk
//! - An append-only file whose 16-byte header is the only thing rewritten
//! - Whole-file advisory locking shared by threads and processes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Db / Transaction                        │
//! │         (auto-commit per mutation, or explicit batch)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       BinaryTree                             │
//! │        (root ref, reload_root, commit, hydration)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Node / Ref  │          │   Storage   │
//!   │ (immutable) │ ◄─load── │  (append)   │
//!   └─────────────┘          └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use arbordb::Db;
//!
//! # fn main() -> arbordb::Result<()> {
//! let mut db = Db::open_path(std::path::Path::new("example.db"))?;
//! db.set(b"k1", b"v1")?;
//! assert_eq!(&db.get(b"k1")?[..], b"v1");
//!
//! let mut tx = db.begin_transaction()?;
//! tx.set(b"k2", b"v2")?;
//! tx.delete(b"k1")?;
//! tx.commit()?;
//!
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod tree;
pub mod db;
pub mod transaction;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ArborError, Result};
pub use config::{Config, SyncStrategy};
pub use db::Db;
pub use transaction::Transaction;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ArborDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
