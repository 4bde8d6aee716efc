//! Seams to the external collaborators: the bridge service and peer channels.

use crate::error::TransferResult;
use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{
    FarmerDescriptor, FileEntry, FrameId, Pointer, ShardDestination, ShardMeta, StoreFileRequest,
};
use futures::Stream;
use std::pin::Pin;

/// A boxed stream of bytes, the read side of a peer channel.
pub type ByteStream = Pin<Box<dyn Stream<Item = TransferResult<Bytes>> + Send>>;

/// Bridge operations the transfer engine consumes.
///
/// Every implementation is expected to authenticate its calls.
#[async_trait]
pub trait BridgeApi: Send + Sync + 'static {
    /// Create a new staging frame.
    async fn create_frame(&self) -> TransferResult<FrameId>;

    /// Register a shard against a frame and learn where to send it.
    async fn add_shard(&self, frame: &FrameId, shard: &ShardMeta)
    -> TransferResult<ShardDestination>;

    /// Commit a frame into a file entry in `bucket`.
    async fn store_file(
        &self,
        bucket: &str,
        token: &str,
        request: &StoreFileRequest,
    ) -> TransferResult<FileEntry>;

    /// Resolve the shard pointers of a stored file, in index order.
    async fn get_file_pointers(
        &self,
        bucket: &str,
        token: &str,
        file_id: &str,
    ) -> TransferResult<Vec<Pointer>>;

    /// Discard a staging frame.
    async fn destroy_frame(&self, frame: &FrameId) -> TransferResult<()>;
}

/// Opens byte channels to farmers.
#[async_trait]
pub trait PeerConnector: Send + Sync + 'static {
    /// Open a channel to `farmer`, presenting `token`.
    ///
    /// Implementations may never resolve on unrecoverable failures; callers
    /// apply their own timeout.
    async fn open(
        &self,
        farmer: &FarmerDescriptor,
        token: &str,
    ) -> TransferResult<Box<dyn PeerChannel>>;
}

/// A direct byte channel to one farmer, owned by whoever opened it.
#[async_trait]
pub trait PeerChannel: Send {
    /// Write a chunk of shard data.
    async fn write(&mut self, data: Bytes) -> TransferResult<()>;

    /// Finish writing and wait for the farmer to acknowledge the shard.
    async fn finish(self: Box<Self>) -> TransferResult<()>;

    /// Turn the channel into the shard byte stream it serves.
    fn into_stream(self: Box<Self>) -> ByteStream;
}
