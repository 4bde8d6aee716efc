//! Merging per-shard byte sources into one ordered stream.

use crate::error::{TransferError, TransferResult};
use crate::traits::ByteStream;
use bytes::Bytes;
use futures::stream::SelectAll;
use futures::{Stream, StreamExt};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

enum SourceEvent {
    Data(Bytes),
    End,
    Failed(TransferError),
}

type TaggedSource = Pin<Box<dyn Stream<Item = (u32, SourceEvent)> + Send>>;

fn tag(index: u32, source: ByteStream) -> TaggedSource {
    let events = source
        .map(move |item| {
            let event = match item {
                Ok(data) => SourceEvent::Data(data),
                Err(e) => SourceEvent::Failed(e),
            };
            (index, event)
        })
        .chain(futures::stream::once(async move { (index, SourceEvent::End) }));
    Box::pin(events)
}

#[derive(Debug, Default)]
struct Pending {
    chunks: VecDeque<Bytes>,
    complete: bool,
}

/// Index-keyed reordering state.
///
/// `cursor` is the next index due for output. Data for the cursor passes
/// straight through; data for later indices waits in `pending` until the
/// cursor reaches them.
#[derive(Debug)]
struct MuxState {
    expected: u32,
    cursor: u32,
    pending: BTreeMap<u32, Pending>,
}

impl MuxState {
    fn new(expected: u32) -> Self {
        Self {
            expected,
            cursor: 0,
            pending: BTreeMap::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.cursor >= self.expected
    }

    fn check_live(&self, index: u32) -> TransferResult<()> {
        if index >= self.expected || index < self.cursor {
            return Err(TransferError::Sequencing(format!(
                "shard source {index} is not live (cursor {}, expected {})",
                self.cursor, self.expected
            )));
        }
        if self.pending.get(&index).is_some_and(|p| p.complete) {
            return Err(TransferError::Sequencing(format!(
                "shard source {index} already completed"
            )));
        }
        Ok(())
    }

    fn on_data(&mut self, index: u32, data: Bytes, out: &mut VecDeque<Bytes>) -> TransferResult<()> {
        self.check_live(index)?;
        if index == self.cursor {
            out.push_back(data);
        } else {
            self.pending.entry(index).or_default().chunks.push_back(data);
        }
        Ok(())
    }

    fn on_end(&mut self, index: u32, out: &mut VecDeque<Bytes>) -> TransferResult<()> {
        self.check_live(index)?;
        if index == self.cursor {
            self.cursor += 1;
            self.flush(out);
        } else {
            self.pending.entry(index).or_default().complete = true;
        }
        Ok(())
    }

    /// Release buffered data now that the cursor moved, advancing past any
    /// sources that already completed.
    fn flush(&mut self, out: &mut VecDeque<Bytes>) {
        while let Some(pending) = self.pending.remove(&self.cursor) {
            out.extend(pending.chunks);
            if !pending.complete {
                break;
            }
            self.cursor += 1;
        }
    }
}

/// Attaches shard sources to a [`ShardMuxer`]. Cheap to clone.
#[derive(Clone)]
pub struct MuxInput {
    expected: u32,
    attached: Arc<Mutex<HashSet<u32>>>,
    tx: mpsc::UnboundedSender<(u32, ByteStream)>,
}

impl MuxInput {
    /// Attach the byte source for shard `index`. Each index is attached once.
    pub fn attach(&self, index: u32, source: ByteStream) -> TransferResult<()> {
        if index >= self.expected {
            return Err(TransferError::Sequencing(format!(
                "shard index {index} out of range for {} shards",
                self.expected
            )));
        }
        let newly_attached = self
            .attached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(index);
        if !newly_attached {
            return Err(TransferError::Sequencing(format!(
                "shard source {index} attached twice"
            )));
        }
        self.tx
            .send((index, source))
            .map_err(|_| TransferError::Transport("shard muxer closed".to_string()))
    }
}

/// One ordered byte stream assembled from per-shard sources.
///
/// Sources may be attached, become ready and deliver data in any order; the
/// output is always in index order. Memory use grows with how far a fast
/// source runs ahead of the slowest one. The first source error is yielded
/// once, buffered data is dropped, and the stream ends; bytes already handed
/// out are not retracted.
pub struct ShardMuxer {
    state: MuxState,
    attach_rx: mpsc::UnboundedReceiver<(u32, ByteStream)>,
    inputs_closed: bool,
    sources: SelectAll<TaggedSource>,
    ready: VecDeque<Bytes>,
    terminated: bool,
}

impl ShardMuxer {
    /// Create a muxer expecting `expected` sources, and the handle to attach them.
    pub fn new(expected: u32) -> (Self, MuxInput) {
        let (tx, attach_rx) = mpsc::unbounded_channel();
        let muxer = Self {
            state: MuxState::new(expected),
            attach_rx,
            inputs_closed: false,
            sources: SelectAll::new(),
            ready: VecDeque::new(),
            terminated: false,
        };
        let input = MuxInput {
            expected,
            attached: Arc::new(Mutex::new(HashSet::new())),
            tx,
        };
        (muxer, input)
    }

    /// Number of sources this muxer waits for.
    pub fn expected(&self) -> u32 {
        self.state.expected
    }

    /// Adapt the muxer into an `AsyncRead`.
    pub fn into_async_read(self) -> impl AsyncRead + Send {
        tokio_util::io::StreamReader::new(self.map(|item| item.map_err(std::io::Error::other)))
    }

    fn apply(&mut self, index: u32, event: SourceEvent) -> TransferResult<()> {
        match event {
            SourceEvent::Data(data) => self.state.on_data(index, data, &mut self.ready),
            SourceEvent::End => self.state.on_end(index, &mut self.ready),
            SourceEvent::Failed(e) => Err(e),
        }
    }

    fn fail(&mut self) {
        self.terminated = true;
        self.state.pending.clear();
        self.ready.clear();
        self.sources = SelectAll::new();
        self.attach_rx.close();
    }
}

impl Stream for ShardMuxer {
    type Item = TransferResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(chunk) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if this.terminated {
                return Poll::Ready(None);
            }
            if this.state.is_done() {
                this.terminated = true;
                this.sources = SelectAll::new();
                return Poll::Ready(None);
            }

            while !this.inputs_closed {
                match this.attach_rx.poll_recv(cx) {
                    Poll::Ready(Some((index, source))) => this.sources.push(tag(index, source)),
                    Poll::Ready(None) => this.inputs_closed = true,
                    Poll::Pending => break,
                }
            }

            match this.sources.poll_next_unpin(cx) {
                Poll::Ready(Some((index, event))) => {
                    if let Err(e) = this.apply(index, event) {
                        this.fail();
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                Poll::Ready(None) if this.inputs_closed => {
                    this.fail();
                    return Poll::Ready(Some(Err(TransferError::Transport(format!(
                        "shard sources closed with {} of {} shards complete",
                        this.state.cursor, this.state.expected
                    )))));
                }
                // Waiting for more sources; the attach receiver holds the waker.
                Poll::Ready(None) => return Poll::Pending,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
