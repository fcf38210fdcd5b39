//! Storage backends
//!
//! A storage file is either a real file (lockable, syncable) or an in-memory
//! buffer used for scratch databases and tests.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use fs2::FileExt;

pub(crate) enum Backing {
    File(File),
    Memory(Cursor<Vec<u8>>),
}

impl Backing {
    pub(crate) fn memory(bytes: Vec<u8>) -> Self {
        Backing::Memory(Cursor::new(bytes))
    }

    /// Current length of the underlying bytes
    pub(crate) fn len(&self) -> io::Result<u64> {
        match self {
            Backing::File(file) => Ok(file.metadata()?.len()),
            Backing::Memory(cursor) => Ok(cursor.get_ref().len() as u64),
        }
    }

    /// Block until the exclusive advisory lock is held
    pub(crate) fn lock_exclusive(&self) -> io::Result<()> {
        match self {
            Backing::File(file) => FileExt::lock_exclusive(file),
            Backing::Memory(_) => Ok(()),
        }
    }

    pub(crate) fn unlock(&self) -> io::Result<()> {
        match self {
            Backing::File(file) => FileExt::unlock(file),
            Backing::Memory(_) => Ok(()),
        }
    }

    pub(crate) fn sync(&self) -> io::Result<()> {
        match self {
            Backing::File(file) => file.sync_data(),
            Backing::Memory(_) => Ok(()),
        }
    }

    /// Copy of the buffer contents; `None` for file backends
    pub(crate) fn memory_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Backing::File(_) => None,
            Backing::Memory(cursor) => Some(cursor.get_ref().clone()),
        }
    }
}

impl Read for Backing {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Backing::File(file) => file.read(buf),
            Backing::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Write for Backing {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Backing::File(file) => file.write(buf),
            Backing::Memory(cursor) => cursor.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Backing::File(file) => file.flush(),
            Backing::Memory(cursor) => cursor.flush(),
        }
    }
}

impl Seek for Backing {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Backing::File(file) => file.seek(pos),
            Backing::Memory(cursor) => cursor.seek(pos),
        }
    }
}
