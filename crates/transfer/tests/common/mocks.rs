use async_trait::async_trait;
use bytes::Bytes;
use ferry_core::{
    FarmerDescriptor, FileEntry, FrameId, Pointer, ShardDestination, ShardMeta, StoreFileRequest,
};
use ferry_transfer::{
    BridgeApi, ByteStream, PeerChannel, PeerConnector, TransferError, TransferResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Storage key a transfer token refers to: `push:frame:index` and
/// `pull:frame:index` both name `frame:index`.
pub fn storage_key(token: &str) -> String {
    token
        .split_once(':')
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| token.to_string())
}

#[derive(Debug, Default)]
pub struct BridgeLog {
    pub frames_created: usize,
    /// Every add_shard call, including failed ones, in arrival order.
    pub attempted: Vec<u32>,
    /// Acknowledged registrations per frame.
    pub registered: HashMap<String, Vec<ShardMeta>>,
    pub stored: Vec<StoreFileRequest>,
    pub destroyed: Vec<FrameId>,
}

/// In-memory bridge that records every call.
#[allow(dead_code)]
pub struct MockBridge {
    pub farmer: FarmerDescriptor,
    pub log: Mutex<BridgeLog>,
    pub fail_create_frame: Option<String>,
    pub fail_add_shard_at: Option<(u32, String)>,
    pub fail_store_file: Option<String>,
}

#[allow(dead_code)]
impl MockBridge {
    pub fn new(farmer: FarmerDescriptor) -> Self {
        Self {
            farmer,
            log: Mutex::new(BridgeLog::default()),
            fail_create_frame: None,
            fail_add_shard_at: None,
            fail_store_file: None,
        }
    }

    pub fn local() -> Self {
        Self::new(FarmerDescriptor::new("127.0.0.1", 4000, "farmer-1"))
    }

    pub fn failing_create_frame(mut self, message: &str) -> Self {
        self.fail_create_frame = Some(message.to_string());
        self
    }

    pub fn failing_add_shard(mut self, index: u32, message: &str) -> Self {
        self.fail_add_shard_at = Some((index, message.to_string()));
        self
    }

    pub fn failing_store_file(mut self, message: &str) -> Self {
        self.fail_store_file = Some(message.to_string());
        self
    }

    pub fn attempted(&self) -> Vec<u32> {
        self.log.lock().unwrap().attempted.clone()
    }

    pub fn registered(&self, frame: &str) -> Vec<ShardMeta> {
        self.log
            .lock()
            .unwrap()
            .registered
            .get(frame)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored(&self) -> Vec<StoreFileRequest> {
        self.log.lock().unwrap().stored.clone()
    }

    pub fn destroyed(&self) -> Vec<FrameId> {
        self.log.lock().unwrap().destroyed.clone()
    }

    pub fn frames_created(&self) -> usize {
        self.log.lock().unwrap().frames_created
    }
}

#[async_trait]
impl BridgeApi for MockBridge {
    async fn create_frame(&self) -> TransferResult<FrameId> {
        if let Some(message) = &self.fail_create_frame {
            return Err(TransferError::Transport(message.clone()));
        }
        let mut log = self.log.lock().unwrap();
        log.frames_created += 1;
        let id = format!("frame{}", log.frames_created);
        log.registered.insert(id.clone(), Vec::new());
        Ok(FrameId::new(id))
    }

    async fn add_shard(
        &self,
        frame: &FrameId,
        shard: &ShardMeta,
    ) -> TransferResult<ShardDestination> {
        // Yield so registrations would interleave if they were issued concurrently.
        tokio::task::yield_now().await;

        let mut log = self.log.lock().unwrap();
        log.attempted.push(shard.index);
        if let Some((index, message)) = &self.fail_add_shard_at
            && *index == shard.index
        {
            return Err(TransferError::Transport(message.clone()));
        }
        let registered = log
            .registered
            .get_mut(frame.as_str())
            .ok_or_else(|| TransferError::Protocol("Frame not found".to_string()))?;
        if registered.len() as u32 != shard.index {
            return Err(TransferError::Protocol(format!(
                "shard {} registered out of order",
                shard.index
            )));
        }
        registered.push(shard.clone());

        Ok(ShardDestination {
            farmer: self.farmer.clone(),
            token: format!("push:{}:{}", frame, shard.index),
            hash: Some(shard.hash.to_hex()),
            operation: Some("PUSH".to_string()),
        })
    }

    async fn store_file(
        &self,
        bucket: &str,
        _token: &str,
        request: &StoreFileRequest,
    ) -> TransferResult<FileEntry> {
        if let Some(message) = &self.fail_store_file {
            return Err(TransferError::Protocol(message.clone()));
        }
        let mut log = self.log.lock().unwrap();
        log.stored.push(request.clone());
        let size = log
            .registered
            .get(request.frame.as_str())
            .map(|shards| shards.iter().map(|s| s.size).sum());
        Ok(FileEntry {
            id: request.frame.to_string(),
            bucket: Some(bucket.to_string()),
            filename: Some(request.filename.clone()),
            mimetype: Some(request.mimetype.clone()),
            size,
            frame: Some(request.frame.clone()),
        })
    }

    async fn get_file_pointers(
        &self,
        _bucket: &str,
        _token: &str,
        file_id: &str,
    ) -> TransferResult<Vec<Pointer>> {
        let log = self.log.lock().unwrap();
        let shards = log
            .registered
            .get(file_id)
            .ok_or_else(|| TransferError::Protocol("File not found".to_string()))?;
        // Reversed so consumers cannot rely on pointer order.
        Ok(shards
            .iter()
            .rev()
            .map(|meta| Pointer {
                index: meta.index,
                size: meta.size,
                farmer: self.farmer.clone(),
                token: format!("pull:{}:{}", file_id, meta.index),
                hash: Some(meta.hash.to_hex()),
            })
            .collect())
    }

    async fn destroy_frame(&self, frame: &FrameId) -> TransferResult<()> {
        self.log.lock().unwrap().destroyed.push(frame.clone());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenBehavior {
    Succeed,
    Fail,
    Hang,
}

/// In-memory farmers: uploads land in `stored`, downloads are served from it.
#[allow(dead_code)]
pub struct MockConnector {
    pub stored: Arc<Mutex<HashMap<String, Bytes>>>,
    pub opens: AtomicUsize,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub open_behavior: OpenBehavior,
    pub reject_uploads: Option<String>,
    /// Limits `reject_uploads` to the shard stored under this key.
    pub reject_key: Option<String>,
    /// Writes never complete, except on a channel that will be rejected.
    pub stall_writes: bool,
    pub download_chunk: usize,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new() -> Self {
        Self {
            stored: Arc::new(Mutex::new(HashMap::new())),
            opens: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            open_behavior: OpenBehavior::Succeed,
            reject_uploads: None,
            reject_key: None,
            stall_writes: false,
            download_chunk: 7,
        }
    }

    pub fn failing_open() -> Self {
        Self {
            open_behavior: OpenBehavior::Fail,
            ..Self::new()
        }
    }

    pub fn hanging_open() -> Self {
        Self {
            open_behavior: OpenBehavior::Hang,
            ..Self::new()
        }
    }

    pub fn rejecting_uploads(message: &str) -> Self {
        Self {
            reject_uploads: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn stalling_writes() -> Self {
        Self {
            stall_writes: true,
            ..Self::new()
        }
    }

    /// Reject the upload stored under `key` while every other channel stalls.
    pub fn rejecting_one_while_others_stall(key: &str, message: &str) -> Self {
        Self {
            reject_uploads: Some(message.to_string()),
            reject_key: Some(key.to_string()),
            stall_writes: true,
            ..Self::new()
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &str) -> Option<Bytes> {
        self.stored.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, data: Bytes) {
        self.stored.lock().unwrap().insert(key.to_string(), data);
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn open(
        &self,
        _farmer: &FarmerDescriptor,
        token: &str,
    ) -> TransferResult<Box<dyn PeerChannel>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.open_behavior {
            OpenBehavior::Fail => {
                return Err(TransferError::Transport("connection refused".to_string()));
            }
            OpenBehavior::Hang => futures::future::pending::<()>().await,
            OpenBehavior::Succeed => {}
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let key = storage_key(token);
        let reject = match &self.reject_key {
            Some(only) if *only != key => None,
            _ => self.reject_uploads.clone(),
        };
        let stall = self.stall_writes && reject.is_none();

        Ok(Box::new(MockChannel {
            key,
            received: Vec::new(),
            stored: Arc::clone(&self.stored),
            active: Arc::clone(&self.active),
            reject,
            stall,
            download_chunk: self.download_chunk,
        }))
    }
}

pub struct MockChannel {
    key: String,
    received: Vec<u8>,
    stored: Arc<Mutex<HashMap<String, Bytes>>>,
    active: Arc<AtomicUsize>,
    reject: Option<String>,
    stall: bool,
    download_chunk: usize,
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerChannel for MockChannel {
    async fn write(&mut self, data: Bytes) -> TransferResult<()> {
        if self.stall {
            futures::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;
        self.received.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> TransferResult<()> {
        tokio::task::yield_now().await;
        let mut channel = self;
        if let Some(message) = &channel.reject {
            return Err(TransferError::Protocol(message.clone()));
        }
        let data = Bytes::from(std::mem::take(&mut channel.received));
        channel.stored.lock().unwrap().insert(channel.key.clone(), data);
        Ok(())
    }

    fn into_stream(self: Box<Self>) -> ByteStream {
        let data = self
            .stored
            .lock()
            .unwrap()
            .get(&self.key)
            .cloned()
            .unwrap_or_default();
        let chunk = self.download_chunk.max(1);
        let channel = self;
        Box::pin(async_stream::stream! {
            let _channel = channel;
            for start in (0..data.len()).step_by(chunk) {
                tokio::task::yield_now().await;
                yield Ok(data.slice(start..(start + chunk).min(data.len())));
            }
        })
    }
}
