//! Core domain types for the ferry storage-network client.
//!
//! This crate defines the data model shared by the other crates:
//! - Content hashes for shard payloads
//! - Shards and their registration metadata
//! - Staging frame lifecycle
//! - Download pointers and farmer descriptors
//! - Client configuration

pub mod config;
pub mod error;
pub mod frame;
pub mod hash;
pub mod pointer;
pub mod shard;

pub use config::{AuthConfig, ClientConfig};
pub use error::{Error, Result};
pub use frame::{
    FileEntry, Frame, FrameId, FrameState, ShardDestination, StagingFrame, StoreFileRequest,
};
pub use hash::{ContentHash, ContentHasher};
pub use pointer::{FarmerDescriptor, Pointer, PointerRecord, pointers_from_records};
pub use shard::{Shard, ShardMeta};

/// Default shard size: 8 MiB
pub const DEFAULT_SHARD_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum shard size: 256 MiB
pub const MAX_SHARD_SIZE: u64 = 256 * 1024 * 1024;

/// Minimum shard size. Any non-empty shard is accepted.
pub const MIN_SHARD_SIZE: u64 = 1;
