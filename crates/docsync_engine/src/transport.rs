//! Frame sources feeding the replicator.

use crate::error::{EngineError, EngineResult};
use docsync_protocol::Frame;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::mpsc;

/// An ordered source of inbound frames.
///
/// This trait abstracts the wire, allowing for different implementations
/// (channels, sockets, in-memory queues for testing).
pub trait FrameSource: Send {
    /// Waits for the next frame. `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> impl Future<Output = EngineResult<Option<Frame>>> + Send;
}

impl FrameSource for mpsc::Receiver<Frame> {
    async fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        Ok(self.recv().await)
    }
}

impl FrameSource for mpsc::UnboundedReceiver<Frame> {
    async fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        Ok(self.recv().await)
    }
}

/// Decodes CBOR-encoded frames arriving on a channel.
#[derive(Debug)]
pub struct CborFrameSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl CborFrameSource {
    /// Wraps a channel of encoded frames.
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl FrameSource for CborFrameSource {
    async fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        match self.rx.recv().await {
            Some(bytes) => Ok(Some(Frame::decode_cbor(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// A fixed in-memory sequence of frames.
#[derive(Debug, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<Frame>,
    fail_after: Option<usize>,
}

impl MemoryFrameSource {
    /// Creates a source yielding `frames` in order.
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            fail_after: None,
        }
    }

    /// Makes the source fail with a retryable transport error after
    /// yielding `count` frames.
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Returns the number of frames not yet yielded.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl From<Vec<Frame>> for MemoryFrameSource {
    fn from(frames: Vec<Frame>) -> Self {
        Self::new(frames)
    }
}

impl FrameSource for MemoryFrameSource {
    async fn next_frame(&mut self) -> EngineResult<Option<Frame>> {
        if let Some(remaining) = self.fail_after.as_mut() {
            if *remaining == 0 {
                return Err(EngineError::transport_retryable("connection lost"));
            }
            *remaining -= 1;
        }
        Ok(self.frames.pop_front())
    }
}
