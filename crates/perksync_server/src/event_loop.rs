//! Async event loop for the replication server.
//!
//! Transports push [`InboundEvent`]s into a channel; one task drains it and
//! calls the registry, so handlers for one connection run in arrival order.

use crate::connections::ConnectionId;
use crate::registry::ServerRegistry;
use bytes::Bytes;
use perksync_protocol::{FrameSink, UserKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Something a transport observed.
pub enum InboundEvent {
    /// A client finished authenticating.
    Connected {
        /// Transport-assigned connection id.
        connection: ConnectionId,
        /// The authenticated user.
        user: UserKey,
        /// Where frames for this client go.
        sink: Arc<dyn FrameSink>,
    },
    /// A client sent a frame.
    Frame {
        /// Connection the frame arrived on.
        connection: ConnectionId,
        /// The encoded frame.
        frame: Bytes,
    },
    /// A client went away.
    Disconnected {
        /// The closed connection.
        connection: ConnectionId,
    },
    /// A user left for good.
    UserRemoved {
        /// The departed user.
        user: UserKey,
    },
    /// Entitlements changed; re-check every record.
    Revalidate,
}

impl std::fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundEvent::Connected {
                connection, user, ..
            } => f
                .debug_struct("Connected")
                .field("connection", connection)
                .field("user", user)
                .finish_non_exhaustive(),
            InboundEvent::Frame { connection, frame } => f
                .debug_struct("Frame")
                .field("connection", connection)
                .field("len", &frame.len())
                .finish(),
            InboundEvent::Disconnected { connection } => f
                .debug_struct("Disconnected")
                .field("connection", connection)
                .finish(),
            InboundEvent::UserRemoved { user } => {
                f.debug_struct("UserRemoved").field("user", user).finish()
            }
            InboundEvent::Revalidate => f.write_str("Revalidate"),
        }
    }
}

/// Creates the channel transports use to feed an [`EventLoop`].
pub fn event_channel() -> (
    mpsc::UnboundedSender<InboundEvent>,
    mpsc::UnboundedReceiver<InboundEvent>,
) {
    mpsc::unbounded_channel()
}

/// Drives a [`ServerRegistry`] from a stream of events.
pub struct EventLoop {
    registry: Arc<ServerRegistry>,
    checkpoint_interval: Option<Duration>,
}

impl EventLoop {
    /// Creates a loop with no periodic checkpoints.
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self {
            registry,
            checkpoint_interval: None,
        }
    }

    /// Checkpoints every `every` while running.
    pub fn with_checkpoint_interval(mut self, every: Duration) -> Self {
        self.checkpoint_interval = Some(every);
        self
    }

    /// Runs until every event sender is dropped, then writes a final
    /// checkpoint.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
        let mut ticker = self.checkpoint_interval.map(|every| {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!(kinds = ?self.registry.kinds(), "replication event loop started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = next_tick(&mut ticker) => self.checkpoint(),
            }
        }

        self.checkpoint();
        info!("replication event loop stopped");
    }

    fn dispatch(&self, event: InboundEvent) {
        debug!(?event, "dispatching");
        match event {
            InboundEvent::Connected {
                connection,
                user,
                sink,
            } => {
                if let Err(e) = self.registry.on_client_connect(connection, user, sink) {
                    warn!(%connection, error = %e, "connect failed");
                    self.registry.on_client_disconnect(connection);
                }
            }
            InboundEvent::Frame { connection, frame } => {
                if let Err(e) = self.registry.handle_frame(connection, &frame) {
                    warn!(%connection, error = %e, client = e.is_client_error(), "frame rejected");
                }
            }
            InboundEvent::Disconnected { connection } => {
                self.registry.on_client_disconnect(connection);
            }
            InboundEvent::UserRemoved { user } => {
                if let Err(e) = self.registry.on_user_removed(user) {
                    warn!(%user, error = %e, "departure handling failed");
                }
            }
            InboundEvent::Revalidate => match self.registry.revalidate_all() {
                Ok(removed) => info!(removed, "revalidation finished"),
                Err(e) => warn!(error = %e, "revalidation failed"),
            },
        }
    }

    fn checkpoint(&self) {
        match self.registry.checkpoint() {
            Ok(0) => {}
            Ok(written) => debug!(written, "checkpoint"),
            Err(e) => warn!(error = %e, "checkpoint failed; will retry"),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
