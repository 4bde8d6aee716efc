//! Peer channels over plain TCP.
//!
//! The client opens a connection and sends one JSON handshake line carrying
//! the transfer token and the farmer's node id. After that the connection is
//! raw shard bytes. For an upload the client half-closes when done and the
//! farmer answers with one JSON line, `{"ok":true}` or
//! `{"ok":false,"error":"..."}`. For a download the farmer streams the shard
//! and closes.

use crate::error::{TransferError, TransferResult};
use crate::traits::{ByteStream, PeerChannel, PeerConnector};
use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::FarmerDescriptor;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

/// First line sent on every channel.
#[derive(Debug, Serialize, Deserialize)]
pub struct Handshake {
    pub token: String,
    pub node_id: String,
}

/// Line a farmer sends after receiving an uploaded shard.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn transport(err: std::io::Error) -> TransferError {
    TransferError::Transport(err.to_string())
}

/// Connects to farmers over TCP.
#[derive(Clone, Debug, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    #[instrument(skip(self, token))]
    async fn open(
        &self,
        farmer: &FarmerDescriptor,
        token: &str,
    ) -> TransferResult<Box<dyn PeerChannel>> {
        let addr = farmer.socket_addr();
        let mut stream = TcpStream::connect((farmer.address.as_str(), farmer.port))
            .await
            .map_err(|e| TransferError::Transport(format!("failed to connect to {addr}: {e}")))?;

        let handshake = Handshake {
            token: token.to_string(),
            node_id: farmer.node_id.clone(),
        };
        let mut line = serde_json::to_vec(&handshake)
            .map_err(|e| TransferError::Protocol(format!("failed to encode handshake: {e}")))?;
        line.push(b'\n');
        stream.write_all(&line).await.map_err(transport)?;

        debug!(%addr, "peer channel open");
        Ok(Box::new(TcpChannel { stream }))
    }
}

/// An open TCP channel to one farmer.
pub struct TcpChannel {
    stream: TcpStream,
}

#[async_trait]
impl PeerChannel for TcpChannel {
    async fn write(&mut self, data: Bytes) -> TransferResult<()> {
        self.stream.write_all(&data).await.map_err(transport)
    }

    async fn finish(self: Box<Self>) -> TransferResult<()> {
        let mut stream = self.stream;
        stream.shutdown().await.map_err(transport)?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        if reader.read_line(&mut line).await.map_err(transport)? == 0 {
            return Err(TransferError::Transport(
                "farmer closed the channel without acknowledging".to_string(),
            ));
        }

        let ack: Ack = serde_json::from_str(line.trim_end())
            .map_err(|e| TransferError::Protocol(format!("invalid acknowledgement: {e}")))?;
        if ack.ok {
            Ok(())
        } else {
            Err(TransferError::Protocol(
                ack.error.unwrap_or_else(|| "shard rejected by farmer".to_string()),
            ))
        }
    }

    fn into_stream(self: Box<Self>) -> ByteStream {
        Box::pin(ReaderStream::new(self.stream).map(|chunk| chunk.map_err(transport)))
    }
}
