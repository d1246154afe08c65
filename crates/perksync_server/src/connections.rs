//! Connected clients.

use bytes::Bytes;
use parking_lot::RwLock;
use perksync_protocol::{FrameSink, UserKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Identifies one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a transport-assigned connection number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the connection number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

struct Connection {
    user: UserKey,
    sink: Arc<dyn FrameSink>,
}

/// The set of clients a manager broadcasts to.
#[derive(Default)]
pub(crate) struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub(crate) fn register(&self, id: ConnectionId, user: UserKey, sink: Arc<dyn FrameSink>) {
        self.connections
            .write()
            .insert(id, Connection { user, sink });
    }

    pub(crate) fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.write().remove(&id).is_some()
    }

    pub(crate) fn user(&self, id: ConnectionId) -> Option<UserKey> {
        self.connections.read().get(&id).map(|c| c.user)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Sends `frame` to every connection, dropping the ones that closed.
    ///
    /// Returns the number of sinks that accepted the frame.
    pub(crate) fn broadcast(&self, frame: &Bytes) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let connections = self.connections.read();
            for (id, connection) in connections.iter() {
                match connection.sink.send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(connection = %id, error = %e, "dropping closed connection");
                        closed.push(*id);
                    }
                }
            }
        }
        if !closed.is_empty() {
            let mut connections = self.connections.write();
            for id in closed {
                connections.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perksync_protocol::frame_channel;

    fn user(n: u8) -> UserKey {
        UserKey::from_bytes([n; 16])
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let registry = ConnectionRegistry::default();
        let (a_tx, mut a_rx) = frame_channel();
        let (b_tx, mut b_rx) = frame_channel();
        registry.register(ConnectionId::new(1), user(1), Arc::new(a_tx));
        registry.register(ConnectionId::new(2), user(2), Arc::new(b_tx));

        assert_eq!(registry.broadcast(&Bytes::from_static(b"hi")), 2);
        assert_eq!(a_rx.drain().len(), 1);
        assert_eq!(b_rx.drain().len(), 1);
    }

    #[test]
    fn closed_connections_are_pruned() {
        let registry = ConnectionRegistry::default();
        let (tx, rx) = frame_channel();
        registry.register(ConnectionId::new(1), user(1), Arc::new(tx));
        drop(rx);

        assert_eq!(registry.broadcast(&Bytes::from_static(b"hi")), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn lookup_and_unregister() {
        let registry = ConnectionRegistry::default();
        let (tx, _rx) = frame_channel();
        registry.register(ConnectionId::new(7), user(3), Arc::new(tx));

        assert_eq!(registry.user(ConnectionId::new(7)), Some(user(3)));
        assert!(registry.unregister(ConnectionId::new(7)));
        assert!(!registry.unregister(ConnectionId::new(7)));
        assert_eq!(registry.user(ConnectionId::new(7)), None);
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(5).to_string(), "conn#5");
    }
}
