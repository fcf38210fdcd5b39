//! DB Module
//!
//! The public handle that coordinates storage, tree and locking.
//!
//! ## Responsibilities
//! - Open (or create) the database file
//! - Auto-transactions: every `set`/`delete` is locked, reloaded, applied
//!   and committed as one unit
//! - Manual transactions through `begin_transaction()`
//! - Lock-free traversal for reads once the root is reloaded

use std::path::Path;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::storage::{Addr, Storage};
use crate::transaction::Transaction;
use crate::tree::{BinaryTree, Order};

/// A handle on one database file
///
/// ## Concurrency Model: one advisory lock per file
///
/// - **Writes** (set/delete/transaction): lock → reload root → mutate →
///   commit → unlock
/// - **Reads** (get/keys): lock → reload root → unlock, then walk the
///   committed nodes without the lock; they never change
///
/// Each handle owns its own file descriptor, so separate handles (threads
/// or processes) serialize on the file lock. One handle is not meant to be
/// shared without a mutex; every method takes `&mut self`.
pub struct Db {
    /// Configuration this handle was opened with, `None` for memory databases
    config: Option<Config>,

    /// Backing storage (header, records, lock)
    pub(crate) storage: Storage,

    /// In-memory view of the tree
    pub(crate) tree: BinaryTree,

    /// Commits performed through this handle
    pub(crate) commit_count: u64,
}

impl Db {
    /// Open or create a database with the given config
    pub fn open(config: Config) -> Result<Self> {
        let mut storage = Storage::open(&config)?;
        let tree = BinaryTree::open(&mut storage)?;

        info!(
            path = %config.path.display(),
            root_addr = storage.root_addr(),
            "database opened"
        );

        Ok(Self {
            config: Some(config),
            storage,
            tree,
            commit_count: 0,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }

    /// Scratch database backed by memory
    pub fn memory() -> Result<Self> {
        let mut storage = Storage::memory()?;
        let tree = BinaryTree::open(&mut storage)?;
        Ok(Self {
            config: None,
            storage,
            tree,
            commit_count: 0,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Fails with `KeyNotFound` if the key is absent.
    pub fn get(&mut self, key: &[u8]) -> Result<Bytes> {
        self.reload_root()?;
        let value = self.tree.get(&mut self.storage, key)?;
        Ok(Bytes::clone(&value))
    }

    /// Get and decode a value stored with `set_as`
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<T> {
        let bytes = self.get(key)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool> {
        self.reload_root()?;
        self.tree.contains_key(&mut self.storage, key)
    }

    /// All keys in ascending order
    pub fn keys(&mut self) -> Result<Vec<Bytes>> {
        self.reload_root()?;
        self.tree.keys(&mut self.storage, Order::In)
    }

    // =========================================================================
    // Writes (auto-transaction)
    // =========================================================================

    /// Put a key-value pair and commit
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = Bytes::copy_from_slice(key);
        let value = Bytes::copy_from_slice(value);
        self.auto_commit(|tree, storage| tree.set(storage, &key, &value))
    }

    /// Encode `value` with bincode and store it under `key`
    pub fn set_as<T: Serialize + ?Sized>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.set(key, &bytes)
    }

    /// Delete a key and commit
    ///
    /// Fails with `KeyNotFound` if the key is absent; nothing is written.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.auto_commit(|tree, storage| tree.delete(storage, key))
    }

    fn auto_commit<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BinaryTree, &mut Storage) -> Result<()>,
    {
        let tree = &mut self.tree;
        let commit_count = &mut self.commit_count;
        self.storage.with_lock(|storage| {
            tree.reload_root(storage)?;
            mutate(tree, storage)?;
            tree.commit(storage)?;
            *commit_count += 1;
            Ok(())
        })
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Start a manual transaction
    ///
    /// The file lock is held until the transaction is committed or dropped.
    pub fn begin_transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::begin(self)
    }

    /// Pick up the root published by other handles
    pub fn reload_root(&mut self) -> Result<()> {
        let tree = &mut self.tree;
        self.storage.with_lock(|storage| tree.reload_root(storage))
    }

    /// Close the database, releasing the lock and syncing the file
    pub fn close(self) -> Result<()> {
        debug!(commits = self.commit_count, "closing database");
        self.storage.close()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of commits performed through this handle
    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    /// Root address as of the last reload or commit
    pub fn root_addr(&self) -> Addr {
        self.storage.root_addr()
    }

    /// Free address as of the last reload or commit
    pub fn free_addr(&self) -> Addr {
        self.storage.free_addr()
    }

    /// Path of the database file, `None` for memory databases
    pub fn path(&self) -> Option<&Path> {
        self.storage.path()
    }

    /// Get the configuration; memory databases have none
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }
}
