//! Resolving download pointers into one ordered byte stream.

use crate::error::{TransferError, TransferResult};
use crate::mux::ShardMuxer;
use crate::traits::{BridgeApi, ByteStream, PeerConnector};
use ferry_core::{ContentHash, Pointer};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Opens a channel per pointer and muxes the shard streams back together.
pub struct DownloadResolver {
    connector: Arc<dyn PeerConnector>,
    open_timeout: Duration,
}

impl DownloadResolver {
    pub fn new(connector: Arc<dyn PeerConnector>, open_timeout: Duration) -> Self {
        Self {
            connector,
            open_timeout,
        }
    }

    /// Open every pointer's channel concurrently and return the ordered output.
    ///
    /// Returns once all channels are open; the caller may start reading while
    /// shards are still arriving. A channel that fails or times out while
    /// opening fails the whole resolution and closes the channels opened so
    /// far. Each shard is checked against the pointer's size and, when
    /// present, its hash; a mismatch surfaces as an error at the end of that
    /// shard.
    #[instrument(skip_all, fields(shards = pointers.len()))]
    pub async fn resolve(&self, pointers: &[Pointer]) -> TransferResult<ShardMuxer> {
        ferry_core::pointer::validate_pointer_indices(pointers)?;
        let expected = u32::try_from(pointers.len())
            .map_err(|_| TransferError::Sequencing("too many pointers".to_string()))?;

        let mut checks = Vec::with_capacity(pointers.len());
        for pointer in pointers {
            let hash = pointer
                .hash
                .as_deref()
                .map(ContentHash::from_hex)
                .transpose()?;
            checks.push((pointer.size, hash));
        }

        let (muxer, input) = ShardMuxer::new(expected);

        let mut opening: FuturesUnordered<_> = pointers
            .iter()
            .zip(checks)
            .map(|(pointer, (size, hash))| {
                let connector = Arc::clone(&self.connector);
                let open_timeout = self.open_timeout;
                async move {
                    let channel = tokio::time::timeout(
                        open_timeout,
                        connector.open(&pointer.farmer, &pointer.token),
                    )
                    .await
                    .map_err(|_| TransferError::Timeout(open_timeout))??;
                    Ok::<_, TransferError>((pointer.index, size, hash, channel))
                }
            })
            .collect();

        while let Some(opened) = opening.next().await {
            let (index, size, hash, channel) = opened?;
            debug!(index, "peer channel ready");
            input.attach(index, verified(index, channel.into_stream(), size, hash))?;
        }

        info!("all shard channels open");
        Ok(muxer)
    }

    /// Look up the pointers of `file_id` in `bucket` and resolve them.
    #[instrument(skip(self, bridge, token))]
    pub async fn resolve_file(
        &self,
        bridge: &dyn BridgeApi,
        bucket: &str,
        token: &str,
        file_id: &str,
    ) -> TransferResult<ShardMuxer> {
        let pointers = bridge.get_file_pointers(bucket, token, file_id).await?;
        debug!(pointers = pointers.len(), "resolved file pointers");
        self.resolve(&pointers).await
    }
}

fn verified(index: u32, source: ByteStream, size: u64, hash: Option<ContentHash>) -> ByteStream {
    Box::pin(async_stream::try_stream! {
        let mut source = source;
        let mut hasher = ContentHash::hasher();
        let mut received = 0u64;
        while let Some(chunk) = source.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            received += chunk.len() as u64;
            yield chunk;
        }

        if received != size {
            Err::<(), _>(TransferError::Protocol(format!(
                "shard {index} ended after {received} of {size} bytes"
            )))?;
        }
        if let Some(expected) = hash {
            let actual = hasher.finalize();
            if actual != expected {
                Err::<(), _>(TransferError::from(ferry_core::Error::HashMismatch {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                }))?;
            }
        }
    })
}
