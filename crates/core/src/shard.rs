//! Shard types.

use crate::hash::ContentHash;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration record for one shard: everything the bridge needs to place
/// it, without the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMeta {
    /// Position in the file (0-indexed).
    pub index: u32,
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the shard payload.
    pub hash: ContentHash,
}

impl ShardMeta {
    /// Create new shard metadata.
    pub fn new(index: u32, size: u64, hash: ContentHash) -> Self {
        Self { index, size, hash }
    }
}

/// A contiguous slice of a file together with its position and hash.
///
/// Immutable once built; the hash is always computed from `data`.
#[derive(Clone)]
pub struct Shard {
    index: u32,
    hash: ContentHash,
    data: Bytes,
}

impl Shard {
    /// Create a new shard from data, computing the hash.
    pub fn new(index: u32, data: Bytes) -> Self {
        let hash = ContentHash::compute(&data);
        Self { index, hash, data }
    }

    /// Position of this shard in its file.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The shard payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The content hash of the payload.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Registration metadata for this shard.
    pub fn meta(&self) -> ShardMeta {
        ShardMeta::new(self.index, self.size(), self.hash)
    }

    /// Consume the shard, returning its payload.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Verify that the data matches the expected hash.
    pub fn verify(&self, expected: &ContentHash) -> crate::Result<()> {
        if &self.hash != expected {
            return Err(crate::Error::HashMismatch {
                expected: expected.to_hex(),
                actual: self.hash.to_hex(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("index", &self.index)
            .field("hash", &self.hash)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Number of shards a source of `total_size` bytes splits into.
pub fn shard_count(total_size: u64, shard_size: u64) -> u64 {
    if shard_size == 0 {
        return 0;
    }
    total_size.div_ceil(shard_size)
}

/// Size of the shard at `index`, or `None` past the end of the source.
///
/// Every shard is `shard_size` bytes except the last, which carries the
/// remainder and is never empty.
pub fn shard_len(total_size: u64, shard_size: u64, index: u64) -> Option<u64> {
    let offset = index.checked_mul(shard_size)?;
    if offset >= total_size {
        return None;
    }
    Some(std::cmp::min(shard_size, total_size - offset))
}

/// Check a shard size against the supported bounds.
pub fn validate_shard_size(size: u64) -> crate::Result<()> {
    if !(crate::MIN_SHARD_SIZE..=crate::MAX_SHARD_SIZE).contains(&size) {
        return Err(crate::Error::InvalidShardSize {
            size,
            min: crate::MIN_SHARD_SIZE,
            max: crate::MAX_SHARD_SIZE,
        });
    }
    Ok(())
}
