//! Staging a local file across farmers.

use crate::buffer::{TransferBuffer, WRITE_CHUNK_SIZE};
use crate::demux::ShardDemuxer;
use crate::error::{TransferError, TransferResult};
use crate::traits::{BridgeApi, PeerConnector};
use ferry_core::{ClientConfig, FileEntry, ShardDestination, StagingFrame, StoreFileRequest};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// MIME type recorded on committed file entries.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Settings the orchestrator takes from [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct UploadOptions {
    pub shard_size: u64,
    pub open_timeout: Duration,
    pub max_parallel_transfers: usize,
    pub spill_threshold: u64,
    pub temp_dir: Option<PathBuf>,
    pub discard_frame_on_failure: bool,
}

impl From<&ClientConfig> for UploadOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            shard_size: config.shard_size,
            open_timeout: config.open_timeout(),
            max_parallel_transfers: config.max_parallel_transfers,
            spill_threshold: config.spill_threshold,
            temp_dir: config.temp_dir.clone(),
            discard_frame_on_failure: config.discard_frame_on_failure,
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// Drives one upload: frame creation, ordered shard registration, parallel
/// shard transfer, and the final commit.
///
/// Registrations reach the bridge strictly in index order; shard `k + 1` is
/// only registered after the registration of shard `k` was acknowledged.
/// Transfers of registered shards run concurrently, bounded by
/// `max_parallel_transfers`. A transfer slot is taken before the next shard is
/// read, so at most that many shards are held between the file and the
/// farmers. The first failure aborts the whole upload.
/// Dropping the returned future aborts in-flight transfers and closes their
/// channels.
pub struct UploadOrchestrator {
    bridge: Arc<dyn BridgeApi>,
    connector: Arc<dyn PeerConnector>,
    options: UploadOptions,
}

impl UploadOrchestrator {
    pub fn new(
        bridge: Arc<dyn BridgeApi>,
        connector: Arc<dyn PeerConnector>,
        options: UploadOptions,
    ) -> Self {
        Self {
            bridge,
            connector,
            options,
        }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload the file at `path` into `bucket` using the PUSH `token`.
    #[instrument(skip(self, token, path), fields(path = %path.as_ref().display()))]
    pub async fn store_file(
        &self,
        bucket: &str,
        token: &str,
        path: impl AsRef<Path>,
    ) -> TransferResult<FileEntry> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::Config(format!("{} does not name a file", path.display()))
            })?;

        let frame_id = self.bridge.create_frame().await?;
        let mut frame = StagingFrame::open(frame_id);
        info!(frame = %frame.id(), "created staging frame");

        if let Err(e) = self.stage_shards(&mut frame, path).await {
            self.abandon(&mut frame).await;
            return Err(e);
        }

        let request = StoreFileRequest {
            frame: frame.id().clone(),
            mimetype: DEFAULT_MIMETYPE.to_string(),
            filename,
        };
        let entry = match self.bridge.store_file(bucket, token, &request).await {
            Ok(entry) => entry,
            Err(e) => {
                self.abandon(&mut frame).await;
                return Err(e);
            }
        };
        frame.commit()?;

        info!(
            frame = %frame.id(),
            file = %entry.id,
            shards = frame.shards().len(),
            size = frame.total_size(),
            "file committed"
        );
        Ok(entry)
    }

    async fn stage_shards(&self, frame: &mut StagingFrame, path: &Path) -> TransferResult<()> {
        let mut demuxer = ShardDemuxer::open(path, self.options.shard_size).await?;
        debug!(
            frame = %frame.id(),
            shards = ?demuxer.expected_shards(),
            "demuxing source file"
        );

        let permits = Arc::new(Semaphore::new(self.options.max_parallel_transfers));
        let mut transfers = JoinSet::new();

        let staged = async {
            loop {
                let permit = Arc::clone(&permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| TransferError::Task("transfer slots closed".to_string()))?;
                let Some(shard) = demuxer.next_shard().await else {
                    break;
                };
                let shard = shard?;

                while let Some(finished) = transfers.try_join_next() {
                    finished??;
                }

                let meta = shard.meta();
                frame.check_append(&meta)?;
                let destination = self.bridge.add_shard(frame.id(), &meta).await?;
                frame.append(meta)?;
                debug!(
                    frame = %frame.id(),
                    index = shard.index(),
                    farmer = ?destination.farmer,
                    "shard registered"
                );

                let index = shard.index();
                let buffer = TransferBuffer::hold(
                    shard.into_data(),
                    self.options.spill_threshold,
                    self.options.temp_dir.as_deref(),
                )
                .await?;

                transfers.spawn(transfer_shard(
                    Arc::clone(&self.connector),
                    destination,
                    index,
                    buffer,
                    permit,
                    self.options.open_timeout,
                ));
            }

            while let Some(finished) = transfers.join_next().await {
                finished??;
            }
            Ok::<(), TransferError>(())
        }
        .await;

        if staged.is_err() {
            // Wait for aborted transfers to drop their channels and buffers.
            transfers.shutdown().await;
        }
        staged
    }

    async fn abandon(&self, frame: &mut StagingFrame) {
        if !self.options.discard_frame_on_failure {
            warn!(frame = %frame.id(), "upload failed, leaving staging frame for expiry");
            return;
        }
        match self.bridge.destroy_frame(frame.id()).await {
            Ok(()) => match frame.discard() {
                Ok(()) => info!(frame = %frame.id(), "discarded staging frame"),
                Err(e) => warn!(frame = %frame.id(), error = %e, "staging frame already closed"),
            },
            Err(e) => warn!(frame = %frame.id(), error = %e, "failed to discard staging frame"),
        }
    }
}

#[instrument(skip_all, fields(index = index, farmer = ?destination.farmer))]
async fn transfer_shard(
    connector: Arc<dyn PeerConnector>,
    destination: ShardDestination,
    index: u32,
    buffer: TransferBuffer,
    _permit: OwnedSemaphorePermit,
    open_timeout: Duration,
) -> TransferResult<()> {
    let mut channel = tokio::time::timeout(
        open_timeout,
        connector.open(&destination.farmer, &destination.token),
    )
    .await
    .map_err(|_| TransferError::Timeout(open_timeout))??;

    let len = buffer.len();
    let mut chunks = buffer.into_chunks(WRITE_CHUNK_SIZE);
    while let Some(chunk) = chunks.next().await {
        channel.write(chunk?).await?;
    }
    channel.finish().await?;

    debug!(len, "shard acknowledged");
    Ok(())
}
