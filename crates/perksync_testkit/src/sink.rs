//! A frame sink that remembers what it was sent.

use bytes::Bytes;
use parking_lot::Mutex;
use perksync_protocol::{ChannelError, ChannelResult, FrameSink, Perk, PerkMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Records every frame sent to it, in order.
///
/// Clones share the same recording, so a test can hand one clone to a
/// server and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Bytes>>>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    /// Creates an open sink with no frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sink as a trait object for a server.
    pub fn shared(&self) -> Arc<dyn FrameSink> {
        Arc::new(self.clone())
    }

    /// Returns every frame received so far.
    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    /// Removes and returns every frame received so far.
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Decodes every frame received so far as messages of `T`.
    ///
    /// # Panics
    ///
    /// Panics if a frame is not a valid `T` message.
    pub fn messages<T: Perk>(&self) -> Vec<PerkMessage<T>> {
        self.frames
            .lock()
            .iter()
            .map(|frame| PerkMessage::decode(frame).expect("recorded frame must decode"))
            .collect()
    }

    /// Returns the number of frames received.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Returns true if no frame was received.
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Makes every later `send` fail as if the client went away.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl FrameSink for RecordingSink {
    fn send(&self, frame: Bytes) -> ChannelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}
