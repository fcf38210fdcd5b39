//! Storage Module
//!
//! Append-only single-file storage with a fixed header.
//!
//! ## Responsibilities
//! - Append length-delimited, checksummed records
//! - Read records back by address
//! - Persist the root/free addresses in the header
//! - Whole-file advisory locking shared across threads and processes
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header (16 bytes)                      │
//! │ ┌──────────────────┬─────────────────┐ │
//! │ │ RootAddr u64 (8) │ FreeAddr u64 (8)│ │
//! │ └──────────────────┴─────────────────┘ │
//! ├────────────────────────────────────────┤
//! │ Record                                 │
//! │ ┌────────┬────────┬──────────────────┐ │
//! │ │Len (4) │CRC (4) │  Payload (Len)   │ │
//! │ └────────┴────────┴──────────────────┘ │
//! │ ... (appended, never rewritten)        │
//! └────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. `RootAddr == 0` means the tree is empty;
//! address 0 is inside the header so it can never name a record.

mod backend;
mod store;

pub use store::Storage;

// =============================================================================
// Shared Constants
// =============================================================================

/// Byte offset of a record inside the storage file
pub type Addr = u64;

/// Sentinel address: "no record" / "no child"
pub const ADDR_NONE: Addr = 0;

/// Size of one header integer
pub const INT_SIZE: u64 = 8;

/// Header offset of the root address
pub const OFFSET_ROOT: u64 = 0;

/// Header offset of the free address
pub const OFFSET_FREE: u64 = INT_SIZE;

/// Header size: RootAddr (8) + FreeAddr (8) = 16 bytes
pub const HEADER_SIZE: u64 = 2 * INT_SIZE;

/// First address handed out to records in a fresh file
pub const ADDR_FREE_START: Addr = HEADER_SIZE;

/// Record frame prefix: Len (4) + CRC (4) = 8 bytes
pub const RECORD_HEADER_SIZE: u64 = 8;
