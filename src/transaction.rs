//! Manual transactions
//!
//! A `Transaction` batches several mutations into one commit. It holds the
//! file lock from `begin_transaction()` until it is committed or dropped,
//! and it mutably borrows the `Db`, so no auto-transaction can interleave.
//!
//! Dropping a transaction without committing rolls the in-memory tree back
//! to the root it started from; the file is never touched. `rollback()` does
//! the same explicitly.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::Db;
use crate::error::Result;
use crate::tree::Link;

/// An open manual transaction on a `Db`
pub struct Transaction<'db> {
    db: &'db mut Db,

    /// Root at begin, restored on rollback
    snapshot: Link,

    /// Whether `begin` acquired the lock (and so must release it)
    owns_lock: bool,

    /// Set once the commit has been published
    committed: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn begin(db: &'db mut Db) -> Result<Self> {
        let owns_lock = db.storage.lock()?;

        if let Err(e) = db.tree.reload_root(&mut db.storage) {
            if owns_lock {
                if let Err(unlock_err) = db.storage.unlock() {
                    warn!(error = %unlock_err, "failed to release lock after reload error");
                }
            }
            return Err(e);
        }

        let snapshot = db.tree.root().cloned();
        debug!(root_addr = db.tree.root_addr(), "transaction started");

        Ok(Self {
            db,
            snapshot,
            owns_lock,
            committed: false,
        })
    }

    /// Read a key, seeing this transaction's uncommitted writes
    pub fn get(&mut self, key: &[u8]) -> Result<Bytes> {
        let value = self.db.tree.get(&mut self.db.storage, key)?;
        Ok(Bytes::clone(&value))
    }

    pub fn get_as<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<T> {
        let bytes = self.get(key)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn contains_key(&mut self, key: &[u8]) -> Result<bool> {
        self.db.tree.contains_key(&mut self.db.storage, key)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = Bytes::copy_from_slice(key);
        let value = Bytes::copy_from_slice(value);
        self.db.tree.set(&mut self.db.storage, &key, &value)
    }

    pub fn set_as<T: Serialize + ?Sized>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.set(key, &bytes)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.db.tree.delete(&mut self.db.storage, key)
    }

    /// True when the transaction has uncommitted changes
    pub fn is_dirty(&self) -> bool {
        self.db.tree.is_dirty()
    }

    /// Write all pending nodes, publish the root and release the lock
    ///
    /// On error the transaction is rolled back like a drop.
    pub fn commit(mut self) -> Result<()> {
        self.db.tree.commit(&mut self.db.storage)?;
        self.db.commit_count += 1;
        self.committed = true;
        debug!(root_addr = self.db.tree.root_addr(), "transaction committed");
        Ok(())
    }

    /// Discard all changes and release the lock
    pub fn rollback(self) {
        drop(self);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.db.tree.restore_root(self.snapshot.take());
            debug!("transaction rolled back");
        }
        if self.owns_lock {
            if let Err(e) = self.db.storage.unlock() {
                warn!(error = %e, "failed to release storage lock");
            }
        }
    }
}
