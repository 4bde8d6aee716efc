//! Holding shard data while it waits for a transfer slot.

use crate::error::TransferResult;
use crate::traits::ByteStream;
use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Chunk size used when streaming a buffered shard to a peer.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Shard bytes parked in memory or, past the spill threshold, in a temp file.
///
/// A spilled buffer owns its temp file; the file is removed when the buffer,
/// or the stream made from it, is dropped.
#[derive(Debug)]
pub enum TransferBuffer {
    Memory(Bytes),
    Spilled { path: TempPath, len: u64 },
}

impl TransferBuffer {
    /// Park `data`, spilling it to `temp_dir` (or the OS temp dir) when it is
    /// larger than `spill_threshold`.
    pub async fn hold(
        data: Bytes,
        spill_threshold: u64,
        temp_dir: Option<&Path>,
    ) -> TransferResult<Self> {
        let len = data.len() as u64;
        if len <= spill_threshold {
            return Ok(Self::Memory(data));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(".ferry-shard-");
        let named = match temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let path = named.into_temp_path();

        let mut file = tokio::fs::OpenOptions::new().write(true).open(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        tracing::debug!(path = %path.display(), len, "spilled shard to disk");
        Ok(Self::Spilled { path, len })
    }

    /// Size of the held data in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(data) => data.len() as u64,
            Self::Spilled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, Self::Spilled { .. })
    }

    /// Stream the held data in chunks of at most `chunk_size` bytes.
    pub fn into_chunks(self, chunk_size: usize) -> ByteStream {
        let chunk_size = chunk_size.max(1);
        match self {
            Self::Memory(data) => {
                let chunks: Vec<TransferResult<Bytes>> = (0..data.len())
                    .step_by(chunk_size)
                    .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
                    .collect();
                Box::pin(futures::stream::iter(chunks))
            }
            Self::Spilled { path, .. } => Box::pin(async_stream::try_stream! {
                let file = tokio::fs::File::open(&path).await?;
                let mut chunks = ReaderStream::with_capacity(file, chunk_size);
                while let Some(chunk) = chunks.next().await {
                    yield chunk?;
                }
                drop(path);
            }),
        }
    }
}
