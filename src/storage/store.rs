//! Storage handle
//!
//! Owns the backing file, the cached header and the advisory lock state.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::{Config, SyncStrategy};
use crate::error::{ArborError, Result};

use super::backend::Backing;
use super::{Addr, ADDR_FREE_START, ADDR_NONE, HEADER_SIZE, OFFSET_FREE, OFFSET_ROOT, RECORD_HEADER_SIZE};

/// Append-only record store with a 16-byte header
///
/// ## Durability:
/// - Records are appended at `free_addr`; nothing before it is ever rewritten
/// - `free_addr` is persisted after each record
/// - Only `set_root_addr` changes what is reachable, so a crash between
///   record writes leaves unreferenced bytes and nothing else
///
/// ## Locking:
/// - `lock()` takes an exclusive whole-file advisory lock
/// - Reentrant within one handle: a second `lock()` is a no-op
/// - Every handle opens its own descriptor, so two handles on one path
///   exclude each other even inside one process
pub struct Storage {
    /// Backing bytes (file or memory)
    backing: Backing,

    /// File path, `None` for memory storage
    path: Option<PathBuf>,

    /// Cached header fields
    root_addr: Addr,
    free_addr: Addr,

    /// Whether this handle currently holds the advisory lock
    locked: bool,

    /// When to fsync after publishing a root
    sync_strategy: SyncStrategy,

    /// Explicit syncs issued through this handle
    sync_count: u64,
}

impl Storage {
    /// Open or create a storage file described by `config`
    ///
    /// A missing or zero-length file gets a fresh header (root = 0,
    /// free = 16). Initialization runs under the lock so two openers of a
    /// new path cannot both write a header.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(config.create_if_missing)
            .truncate(false)
            .open(&config.path)?;

        let mut storage = Self::with_backing(Backing::File(file), config.sync_strategy);
        storage.path = Some(config.path.clone());
        storage.with_lock(|s| s.initialize())?;

        debug!(
            path = %config.path.display(),
            root_addr = storage.root_addr,
            free_addr = storage.free_addr,
            "storage opened"
        );
        Ok(storage)
    }

    /// Open with a path (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(&Config::builder().path(path).build())
    }

    /// Create an empty in-memory storage
    pub fn memory() -> Result<Self> {
        Self::from_bytes(Vec::new())
    }

    /// Reopen an in-memory storage from a previous `to_bytes()` image
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut storage = Self::with_backing(Backing::memory(bytes), SyncStrategy::OsManaged);
        storage.initialize()?;
        Ok(storage)
    }

    /// Snapshot of an in-memory storage; `None` for file storage
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        self.backing.memory_bytes()
    }

    fn with_backing(backing: Backing, sync_strategy: SyncStrategy) -> Self {
        Self {
            backing,
            path: None,
            root_addr: ADDR_NONE,
            free_addr: ADDR_FREE_START,
            locked: false,
            sync_strategy,
            sync_count: 0,
        }
    }

    fn initialize(&mut self) -> Result<()> {
        if self.backing.len()? == 0 {
            self.set_root_addr(ADDR_NONE)?;
            self.write_int(OFFSET_FREE, ADDR_FREE_START)?;
            self.free_addr = ADDR_FREE_START;
            self.backing.sync()?;
            Ok(())
        } else {
            self.reload()
        }
    }

    // =========================================================================
    // Header
    // =========================================================================

    /// Address of the current root node record (0 = empty tree)
    pub fn root_addr(&self) -> Addr {
        self.root_addr
    }

    /// Address where the next record will be appended
    pub fn free_addr(&self) -> Addr {
        self.free_addr
    }

    /// Path of the backing file, `None` for memory storage
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the header from disk
    ///
    /// Picks up roots published by other handles. The data region is not
    /// touched.
    pub fn reload(&mut self) -> Result<()> {
        let len = self.backing.len()?;
        if len < HEADER_SIZE {
            return Err(ArborError::CorruptStore(format!(
                "file is {} bytes, shorter than the {}-byte header",
                len, HEADER_SIZE
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        self.backing.seek(SeekFrom::Start(OFFSET_ROOT))?;
        self.backing.read_exact(&mut header)?;

        let mut buf = &header[..];
        let root_addr = buf.get_u64_le();
        let free_addr = buf.get_u64_le();

        if free_addr < ADDR_FREE_START || free_addr > len {
            return Err(ArborError::CorruptStore(format!(
                "free address {} outside [{}, {}]",
                free_addr, ADDR_FREE_START, len
            )));
        }
        if root_addr != ADDR_NONE && (root_addr < ADDR_FREE_START || root_addr >= free_addr) {
            return Err(ArborError::CorruptStore(format!(
                "root address {} outside data region [{}, {})",
                root_addr, ADDR_FREE_START, free_addr
            )));
        }

        self.root_addr = root_addr;
        self.free_addr = free_addr;
        trace!(root_addr, free_addr, "header reloaded");
        Ok(())
    }

    /// Publish a new root address
    ///
    /// This is the only write that changes what is reachable.
    pub fn set_root_addr(&mut self, addr: Addr) -> Result<()> {
        self.write_int(OFFSET_ROOT, addr)?;
        self.root_addr = addr;
        Ok(())
    }

    /// Persist a new free address. Must not move backwards.
    pub fn set_free_addr(&mut self, addr: Addr) -> Result<()> {
        debug_assert!(addr >= self.free_addr, "free address moved backwards");
        self.write_int(OFFSET_FREE, addr)?;
        self.free_addr = addr;
        Ok(())
    }

    fn write_int(&mut self, offset: u64, value: u64) -> Result<()> {
        self.backing.seek(SeekFrom::Start(offset))?;
        self.backing.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Append a record and return its address
    ///
    /// Frame: [Len u32][CRC32 u32][payload]
    pub fn write_data(&mut self, payload: &[u8]) -> Result<Addr> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            ArborError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("record of {} bytes exceeds u32 length prefix", payload.len()),
            ))
        })?;

        let mut frame = BytesMut::with_capacity(RECORD_HEADER_SIZE as usize + payload.len());
        frame.put_u32_le(len);
        frame.put_u32_le(crc32fast::hash(payload));
        frame.put_slice(payload);

        let addr = self.free_addr;
        self.backing.seek(SeekFrom::Start(addr))?;
        self.backing.write_all(&frame)?;
        self.set_free_addr(addr + frame.len() as u64)?;

        trace!(addr, len, "record written");
        Ok(addr)
    }

    /// Read the record payload at `addr`
    ///
    /// Returns `CorruptStore` if the frame lies outside the data region or
    /// its checksum does not match.
    pub fn read_data(&mut self, addr: Addr) -> Result<Bytes> {
        let outside = || {
            ArborError::CorruptStore(format!(
                "record address {} outside data region [{}, {})",
                addr, ADDR_FREE_START, self.free_addr
            ))
        };
        let header_end = addr.checked_add(RECORD_HEADER_SIZE).ok_or_else(outside)?;
        if addr < ADDR_FREE_START || header_end > self.free_addr {
            return Err(outside());
        }

        let mut frame_header = [0u8; RECORD_HEADER_SIZE as usize];
        self.backing.seek(SeekFrom::Start(addr))?;
        self.backing.read_exact(&mut frame_header)?;

        let mut buf = &frame_header[..];
        let len = buf.get_u32_le() as u64;
        let crc = buf.get_u32_le();

        let end = header_end.checked_add(len);
        if end.map_or(true, |end| end > self.free_addr) {
            return Err(ArborError::CorruptStore(format!(
                "record at {} claims {} bytes, past free address {}",
                addr, len, self.free_addr
            )));
        }

        let mut payload = vec![0u8; len as usize];
        self.backing.read_exact(&mut payload)?;

        if crc32fast::hash(&payload) != crc {
            return Err(ArborError::CorruptStore(format!(
                "checksum mismatch for record at {}",
                addr
            )));
        }

        trace!(addr, len, "record read");
        Ok(Bytes::from(payload))
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Acquire the exclusive lock, blocking until it is available
    ///
    /// Returns `true` if this call acquired it, `false` if the handle
    /// already held it.
    pub fn lock(&mut self) -> Result<bool> {
        if self.locked {
            return Ok(false);
        }
        self.backing.lock_exclusive().map_err(ArborError::Lock)?;
        self.locked = true;
        trace!("storage locked");
        Ok(true)
    }

    /// Release the lock if held
    pub fn unlock(&mut self) -> Result<()> {
        if !self.locked {
            return Ok(());
        }
        self.backing.unlock().map_err(ArborError::Lock)?;
        self.locked = false;
        trace!("storage unlocked");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Run `f` with the lock held
    ///
    /// Releases the lock on every exit path if this call acquired it; a lock
    /// already held by the caller stays held.
    pub fn with_lock<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let acquired = self.lock()?;
        let result = f(self);
        if acquired {
            if let Err(e) = self.unlock() {
                if result.is_ok() {
                    return Err(e);
                }
                warn!(error = %e, "failed to release storage lock after error");
            }
        }
        result
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Force written bytes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.backing.flush()?;
        self.backing.sync()?;
        self.sync_count += 1;
        Ok(())
    }

    /// Number of `sync` calls made through this handle
    pub fn sync_count(&self) -> u64 {
        self.sync_count
    }

    /// Sync according to the configured strategy; called after a commit
    pub fn sync_on_commit(&mut self) -> Result<()> {
        match self.sync_strategy {
            SyncStrategy::EveryCommit => self.sync(),
            SyncStrategy::OsManaged => Ok(self.backing.flush()?),
        }
    }

    /// Release the lock and sync; the handle is consumed
    pub fn close(mut self) -> Result<()> {
        self.unlock()?;
        self.sync()?;
        debug!(path = ?self.path, "storage closed");
        Ok(())
    }
}
