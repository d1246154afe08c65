//! The frame channel.
//!
//! The managers never own a connection. They hand encoded frames to a
//! [`FrameSink`]; whatever sits behind it decides how bytes reach the peer.
//! Sinks must deliver frames of one connection in the order they were sent.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors raised by a frame sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The receiving side has gone away.
    #[error("channel closed")]
    Closed,
}

/// The sending half of one connection.
pub trait FrameSink: Send + Sync {
    /// Queues a frame for delivery. Never blocks.
    fn send(&self, frame: Bytes) -> ChannelResult<()>;

    /// Returns true while the peer can still receive frames.
    fn is_open(&self) -> bool;
}

/// Creates an in-process, ordered, unbounded frame channel.
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Sending half of [`frame_channel`].
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl FrameSink for FrameSender {
    fn send(&self, frame: Bytes) -> ChannelResult<()> {
        self.tx.send(frame).map_err(|_| ChannelError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving half of [`frame_channel`].
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl FrameReceiver {
    /// Waits for the next frame. Returns `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Returns the next queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Takes every frame queued so far, oldest first.
    pub fn drain(&mut self) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = self.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Closes the channel; later sends fail with [`ChannelError::Closed`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}
