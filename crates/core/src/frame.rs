//! Staging frame types and lifecycle.

use crate::pointer::FarmerDescriptor;
use crate::shard::ShardMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned identifier for a staging frame.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(String);

impl FrameId {
    /// Wrap a server-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Staging frame state. Transitions only forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameState {
    /// Frame is open and accepting shards.
    Open,
    /// The file entry was committed from this frame.
    Committed,
    /// The frame was discarded.
    Discarded,
}

impl FrameState {
    /// Check if the frame can still receive shards.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the frame reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Discarded)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

/// Client-side record of a staging frame owned by one upload.
///
/// Mirrors what has been acknowledged by the bridge so ordering violations are
/// caught locally before any further request is made.
#[derive(Clone, Debug)]
pub struct StagingFrame {
    id: FrameId,
    shards: Vec<ShardMeta>,
    state: FrameState,
}

impl StagingFrame {
    /// Start tracking a freshly created frame.
    pub fn open(id: FrameId) -> Self {
        Self {
            id,
            shards: Vec::new(),
            state: FrameState::Open,
        }
    }

    /// The frame identifier.
    pub fn id(&self) -> &FrameId {
        &self.id
    }

    /// Shards appended so far, in index order.
    pub fn shards(&self) -> &[ShardMeta] {
        &self.shards
    }

    /// Current state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index the next appended shard must carry.
    pub fn next_index(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Total bytes across appended shards.
    pub fn total_size(&self) -> u64 {
        self.shards.iter().map(|s| s.size).sum()
    }

    /// Check that `meta` may be appended next, without recording it.
    pub fn check_append(&self, meta: &ShardMeta) -> crate::Result<()> {
        self.ensure_open("append shard")?;
        if meta.index != self.next_index() {
            return Err(crate::Error::OutOfOrder {
                expected: self.next_index(),
                actual: meta.index,
            });
        }
        Ok(())
    }

    /// Record an acknowledged shard registration.
    pub fn append(&mut self, meta: ShardMeta) -> crate::Result<()> {
        self.check_append(&meta)?;
        self.shards.push(meta);
        Ok(())
    }

    /// Mark the frame committed into a file entry.
    pub fn commit(&mut self) -> crate::Result<()> {
        self.ensure_open("commit")?;
        self.state = FrameState::Committed;
        Ok(())
    }

    /// Mark the frame discarded.
    pub fn discard(&mut self) -> crate::Result<()> {
        self.ensure_open("discard")?;
        self.state = FrameState::Discarded;
        Ok(())
    }

    fn ensure_open(&self, action: &'static str) -> crate::Result<()> {
        if !self.state.is_active() {
            return Err(crate::Error::FrameClosed {
                frame: self.id.to_string(),
                state: self.state.to_string(),
                action,
            });
        }
        Ok(())
    }
}

/// Staging frame as reported by the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    /// Frame identifier.
    pub id: FrameId,
    /// Shards registered so far.
    #[serde(default)]
    pub shards: Vec<ShardMeta>,
    /// Whether the frame has been consumed by a file entry.
    #[serde(default)]
    pub locked: bool,
    /// Creation timestamp as sent by the server.
    #[serde(default)]
    pub created: Option<String>,
}

/// Where the bridge placed a registered shard.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardDestination {
    /// Farmer that will store the shard.
    pub farmer: FarmerDescriptor,
    /// Transfer token to present to the farmer.
    #[serde(default)]
    pub token: String,
    /// Hash the farmer expects, echoed back by the bridge.
    #[serde(default)]
    pub hash: Option<String>,
    /// Contract operation, normally `PUSH`.
    #[serde(default)]
    pub operation: Option<String>,
}

/// Request to commit a staging frame into a file entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreFileRequest {
    /// Frame holding the staged shards.
    pub frame: FrameId,
    /// MIME type recorded on the entry.
    pub mimetype: String,
    /// File name recorded on the entry.
    pub filename: String,
}

/// A committed file entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    /// File identifier.
    pub id: String,
    /// Owning bucket.
    #[serde(default)]
    pub bucket: Option<String>,
    /// File name.
    #[serde(default)]
    pub filename: Option<String>,
    /// MIME type.
    #[serde(default)]
    pub mimetype: Option<String>,
    /// Total size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Frame the entry was built from.
    #[serde(default)]
    pub frame: Option<FrameId>,
}
