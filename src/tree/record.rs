//! Record payload codecs
//!
//! The storage layer frames and checksums records; this module defines what
//! goes inside them. Both kinds start with a format version byte. Which kind
//! a record is follows from the ref that points at it.
//!
//! ```text
//! Value: [Version u8][value bytes ...]
//! Node:  [Version u8][KeyLen u32][Key][ValueAddr u64][LeftAddr u64][RightAddr u64]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ArborError, Result};
use crate::storage::{Addr, ADDR_NONE};

/// Current record format version
pub const RECORD_VERSION: u8 = 1;

/// ValueAddr (8) + LeftAddr (8) + RightAddr (8)
const NODE_ADDRS_SIZE: usize = 24;

/// Encode a value record payload
pub fn encode_value(value: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + value.len());
    buf.put_u8(RECORD_VERSION);
    buf.put_slice(value);
    buf.freeze()
}

/// Decode a value record payload (zero-copy slice of `payload`)
pub fn decode_value(mut payload: Bytes) -> Result<Bytes> {
    check_version(&mut payload, "value")?;
    Ok(payload)
}

/// On-disk form of a node: the key plus addresses of everything it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub key: Bytes,
    pub value_addr: Addr,
    pub left_addr: Addr,
    pub right_addr: Addr,
}

impl NodeRecord {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + 4 + self.key.len() + NODE_ADDRS_SIZE);
        buf.put_u8(RECORD_VERSION);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_slice(&self.key);
        buf.put_u64_le(self.value_addr);
        buf.put_u64_le(self.left_addr);
        buf.put_u64_le(self.right_addr);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        check_version(&mut payload, "node")?;

        if payload.remaining() < 4 {
            return Err(ArborError::CorruptStore(
                "node record truncated before key length".to_string(),
            ));
        }
        let key_len = payload.get_u32_le() as usize;

        if payload.remaining() != key_len + NODE_ADDRS_SIZE {
            return Err(ArborError::CorruptStore(format!(
                "node record has {} bytes after key length, expected {}",
                payload.remaining(),
                key_len + NODE_ADDRS_SIZE
            )));
        }
        let key = payload.copy_to_bytes(key_len);
        let value_addr = payload.get_u64_le();
        let left_addr = payload.get_u64_le();
        let right_addr = payload.get_u64_le();

        if value_addr == ADDR_NONE {
            return Err(ArborError::CorruptStore(
                "node record without a value address".to_string(),
            ));
        }

        Ok(Self {
            key,
            value_addr,
            left_addr,
            right_addr,
        })
    }
}

fn check_version(payload: &mut Bytes, kind: &str) -> Result<()> {
    if !payload.has_remaining() {
        return Err(ArborError::CorruptStore(format!("empty {} record", kind)));
    }
    let version = payload.get_u8();
    if version != RECORD_VERSION {
        return Err(ArborError::CorruptStore(format!(
            "unsupported {} record version: {}",
            kind, version
        )));
    }
    Ok(())
}
