//! Routing server frames to the client of their payload kind.

use crate::error::{ClientError, ClientResult};
use crate::manager::{ClientReplicationManager, ReconcileOutcome};
use perksync_protocol::{FrameHeader, FrameSink, Perk};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// The kind-erased surface of a [`ClientReplicationManager`].
pub trait PerkClient: Send + Sync {
    /// Payload kind this client mirrors.
    fn kind(&self) -> &'static str;

    /// Attaches the outbound sink.
    fn connect(&self, sink: Arc<dyn FrameSink>);

    /// Drops the sink and clears the mirror.
    fn on_disconnect(&self);

    /// Decodes and applies one server frame of this kind.
    fn handle_frame(&self, frame: &[u8]) -> ClientResult<()>;

    /// Reconciles the local user.
    fn reconcile_local(&self) -> ClientResult<ReconcileOutcome>;

    /// Returns true once this kind's Sync arrived.
    fn is_synced(&self) -> bool;
}

impl<T: Perk> PerkClient for ClientReplicationManager<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn connect(&self, sink: Arc<dyn FrameSink>) {
        ClientReplicationManager::connect(self, sink)
    }

    fn on_disconnect(&self) {
        ClientReplicationManager::on_disconnect(self)
    }

    fn handle_frame(&self, frame: &[u8]) -> ClientResult<()> {
        ClientReplicationManager::handle_frame(self, frame)
    }

    fn reconcile_local(&self) -> ClientResult<ReconcileOutcome> {
        ClientReplicationManager::reconcile_local(self)
    }

    fn is_synced(&self) -> bool {
        ClientReplicationManager::is_synced(self)
    }
}

/// Holds one client per payload kind.
#[derive(Default)]
pub struct ClientRegistry {
    clients: BTreeMap<&'static str, Arc<dyn PerkClient>>,
}

impl ClientRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client. Fails if its kind is already registered.
    pub fn register(&mut self, client: Arc<dyn PerkClient>) -> ClientResult<()> {
        let kind = client.kind();
        if self.clients.contains_key(kind) {
            return Err(ClientError::DuplicatePerk(kind));
        }
        self.clients.insert(kind, client);
        Ok(())
    }

    /// Returns the client for `kind`.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn PerkClient>> {
        self.clients.get(kind)
    }

    /// Attaches `sink` to every client.
    pub fn connect(&self, sink: Arc<dyn FrameSink>) {
        for client in self.clients.values() {
            client.connect(Arc::clone(&sink));
        }
    }

    /// Disconnects every client.
    pub fn on_disconnect(&self) {
        for client in self.clients.values() {
            client.on_disconnect();
        }
    }

    /// Routes a server frame by the payload kind in its header.
    pub fn handle_frame(&self, frame: &[u8]) -> ClientResult<()> {
        let header = FrameHeader::peek(frame)?;
        let client = self
            .clients
            .get(header.perk.as_str())
            .ok_or_else(|| ClientError::UnknownPerk(header.perk.clone()))?;
        client.handle_frame(frame)
    }

    /// Reconciles the local user in every client.
    ///
    /// Keeps going past failures and returns the first one.
    pub fn reconcile_local(&self) -> ClientResult<Vec<(&'static str, ReconcileOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.clients.len());
        let mut first_error = None;
        for (kind, client) in &self.clients {
            match client.reconcile_local() {
                Ok(outcome) => outcomes.push((*kind, outcome)),
                Err(e) => {
                    warn!(kind, error = %e, "reconcile failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Returns true once every client received its Sync.
    pub fn is_synced(&self) -> bool {
        self.clients.values().all(|client| client.is_synced())
    }
}
