//! Shard transfer engine for the ferry client.
//!
//! This crate provides:
//! - Demuxing a file into ordered, fixed-size shards
//! - Muxing per-shard byte sources back into one ordered stream
//! - Upload orchestration against a bridge and farmers
//! - Download resolution from pointers
//! - A TCP peer channel

pub mod buffer;
pub mod channels;
pub mod demux;
pub mod download;
pub mod error;
pub mod mux;
pub mod traits;
pub mod upload;

pub use buffer::TransferBuffer;
pub use channels::tcp::{TcpChannel, TcpConnector};
pub use demux::ShardDemuxer;
pub use download::DownloadResolver;
pub use error::{TransferError, TransferResult};
pub use mux::{MuxInput, ShardMuxer};
pub use traits::{BridgeApi, ByteStream, PeerChannel, PeerConnector};
pub use upload::{UploadOptions, UploadOrchestrator};
