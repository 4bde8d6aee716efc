//! Splitting a byte source into ordered, fixed-size shards.

use crate::error::{TransferError, TransferResult};
use bytes::Bytes;
use ferry_core::Shard;
use futures::Stream;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Lazily splits a byte source into shards of `shard_size` bytes.
///
/// Shards come out with contiguous indices starting at 0; the last one carries
/// the remainder. The consumer sets the pace: nothing is read until the next
/// shard is requested. After a read error the sequence ends, and a partially
/// read shard is never emitted. To start over, build a new demuxer.
pub struct ShardDemuxer<R> {
    reader: R,
    shard_size: usize,
    total_size: Option<u64>,
    next_index: u32,
    finished: bool,
}

impl ShardDemuxer<tokio::fs::File> {
    /// Open a local file for demuxing.
    pub async fn open(path: impl AsRef<Path>, shard_size: u64) -> TransferResult<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let total_size = file.metadata().await?.len();
        let mut demuxer = Self::new(file, shard_size)?;
        demuxer.total_size = Some(total_size);
        Ok(demuxer)
    }
}

impl<R: AsyncRead + Unpin + Send> ShardDemuxer<R> {
    /// Wrap a byte source.
    pub fn new(reader: R, shard_size: u64) -> TransferResult<Self> {
        ferry_core::shard::validate_shard_size(shard_size)?;
        let shard_size = usize::try_from(shard_size).map_err(|_| {
            TransferError::Config("shard size exceeds platform limits".to_string())
        })?;
        Ok(Self {
            reader,
            shard_size,
            total_size: None,
            next_index: 0,
            finished: false,
        })
    }

    /// Shard size in bytes.
    pub fn shard_size(&self) -> u64 {
        self.shard_size as u64
    }

    /// Size of the source, when known up front.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Number of shards the source will produce, when its size is known.
    pub fn expected_shards(&self) -> Option<u64> {
        self.total_size
            .map(|total| ferry_core::shard::shard_count(total, self.shard_size as u64))
    }

    /// Read the next shard, or `None` once the source is exhausted.
    pub async fn next_shard(&mut self) -> Option<TransferResult<Shard>> {
        if self.finished {
            return None;
        }

        let mut buf = vec![0u8; self.shard_size];
        let mut filled = 0;
        while filled < self.shard_size {
            match self.reader.read(&mut buf[filled..]).await {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(TransferError::Io(e)));
                }
            }
        }

        if filled == 0 {
            return None;
        }

        buf.truncate(filled);
        let shard = Shard::new(self.next_index, Bytes::from(buf));
        self.next_index += 1;
        Some(Ok(shard))
    }

    /// Consume the demuxer as a stream of shards.
    pub fn into_stream(self) -> impl Stream<Item = TransferResult<Shard>> + Send {
        futures::stream::unfold(self, |mut demuxer| async move {
            demuxer.next_shard().await.map(|item| (item, demuxer))
        })
    }
}
