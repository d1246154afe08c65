//! Routing frames to the manager of their payload kind.

use crate::connections::ConnectionId;
use crate::error::{ServerError, ServerResult};
use crate::manager::ServerReplicationManager;
use perksync_protocol::{FrameHeader, FrameSink, Perk, UserKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// The kind-erased surface of a [`ServerReplicationManager`].
pub trait PerkService: Send + Sync {
    /// Payload kind this service replicates.
    fn kind(&self) -> &'static str;

    /// Registers a client and sends it the Sync for this kind.
    fn on_client_connect(
        &self,
        connection: ConnectionId,
        user: UserKey,
        sink: Arc<dyn FrameSink>,
    ) -> ServerResult<()>;

    /// Forgets a client.
    fn on_client_disconnect(&self, connection: ConnectionId) -> bool;

    /// Applies the departure policy to a user.
    fn on_user_removed(&self, subject: UserKey) -> ServerResult<bool>;

    /// Handles one client frame of this kind.
    fn handle_frame(&self, connection: ConnectionId, frame: &[u8]) -> ServerResult<()>;

    /// Re-checks every record against the gate.
    fn revalidate_all(&self) -> ServerResult<usize>;

    /// Saves the records if they changed.
    fn checkpoint(&self) -> ServerResult<bool>;
}

impl<T: Perk> PerkService for ServerReplicationManager<T> {
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn on_client_connect(
        &self,
        connection: ConnectionId,
        user: UserKey,
        sink: Arc<dyn FrameSink>,
    ) -> ServerResult<()> {
        ServerReplicationManager::on_client_connect(self, connection, user, sink)
    }

    fn on_client_disconnect(&self, connection: ConnectionId) -> bool {
        ServerReplicationManager::on_client_disconnect(self, connection)
    }

    fn on_user_removed(&self, subject: UserKey) -> ServerResult<bool> {
        ServerReplicationManager::on_user_removed(self, subject)
    }

    fn handle_frame(&self, connection: ConnectionId, frame: &[u8]) -> ServerResult<()> {
        ServerReplicationManager::handle_frame(self, connection, frame)
    }

    fn revalidate_all(&self) -> ServerResult<usize> {
        ServerReplicationManager::revalidate_all(self)
    }

    fn checkpoint(&self) -> ServerResult<bool> {
        ServerReplicationManager::checkpoint(self)
    }
}

/// Holds one service per payload kind and routes frames between them.
///
/// Kinds are independent: each has its own store, its own Sync on connect
/// and its own broadcasts.
#[derive(Default)]
pub struct ServerRegistry {
    services: BTreeMap<&'static str, Arc<dyn PerkService>>,
}

impl ServerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service. Fails if its kind is already registered.
    pub fn register(&mut self, service: Arc<dyn PerkService>) -> ServerResult<()> {
        let kind = service.kind();
        if self.services.contains_key(kind) {
            return Err(ServerError::DuplicatePerk(kind));
        }
        self.services.insert(kind, service);
        Ok(())
    }

    /// Returns the service for `kind`.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn PerkService>> {
        self.services.get(kind)
    }

    /// Returns the registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.services.keys().copied().collect()
    }

    /// Connects a client to every service; it receives one Sync per kind.
    pub fn on_client_connect(
        &self,
        connection: ConnectionId,
        user: UserKey,
        sink: Arc<dyn FrameSink>,
    ) -> ServerResult<()> {
        for service in self.services.values() {
            service.on_client_connect(connection, user, Arc::clone(&sink))?;
        }
        Ok(())
    }

    /// Disconnects a client from every service.
    pub fn on_client_disconnect(&self, connection: ConnectionId) {
        for service in self.services.values() {
            service.on_client_disconnect(connection);
        }
    }

    /// Applies every service's departure policy to `subject`.
    pub fn on_user_removed(&self, subject: UserKey) -> ServerResult<usize> {
        let mut purged = 0;
        for service in self.services.values() {
            if service.on_user_removed(subject)? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    /// Routes a client frame by the payload kind in its header.
    pub fn handle_frame(&self, connection: ConnectionId, frame: &[u8]) -> ServerResult<()> {
        let header = FrameHeader::peek(frame)?;
        let service = self
            .services
            .get(header.perk.as_str())
            .ok_or_else(|| ServerError::UnknownPerk(header.perk.clone()))?;
        service.handle_frame(connection, frame)
    }

    /// Revalidates every service. Returns the total number removed.
    pub fn revalidate_all(&self) -> ServerResult<usize> {
        let mut removed = 0;
        for service in self.services.values() {
            removed += service.revalidate_all()?;
        }
        Ok(removed)
    }

    /// Checkpoints every service, even if one of them fails.
    ///
    /// Returns the number of snapshots written, or the first error.
    pub fn checkpoint(&self) -> ServerResult<usize> {
        let mut written = 0;
        let mut first_error = None;
        for service in self.services.values() {
            match service.checkpoint() {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(kind = service.kind(), error = %e, "checkpoint failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeparturePolicy, ServerConfig};
    use perksync_protocol::{
        frame_channel, MessageType, MoaSkin, MoaSkinPerk, PerkGate, PerkMessage, Requirement,
        StaticIdentities, VerificationContext,
    };
    use perksync_store::MemoryPersistence;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Title {
        text: Option<String>,
    }

    impl Perk for Title {
        const KIND: &'static str = "title";

        fn requirement(&self) -> Requirement {
            Requirement::Anyone
        }
    }

    fn key(n: u8) -> UserKey {
        UserKey::from_bytes([n; 16])
    }

    fn service<T: Perk>() -> Arc<ServerReplicationManager<T>> {
        service_with(ServerConfig::default(), Arc::new(StaticIdentities::new()))
    }

    fn service_with<T: Perk>(
        config: ServerConfig,
        identities: Arc<StaticIdentities>,
    ) -> Arc<ServerReplicationManager<T>> {
        Arc::new(ServerReplicationManager::<T>::new(
            config,
            Arc::new(PerkGate),
            identities,
            Arc::new(MemoryPersistence::new()),
        ))
    }

    fn title(text: &str) -> Title {
        Title {
            text: Some(text.into()),
        }
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut registry = ServerRegistry::new();
        registry.register(service::<MoaSkinPerk>()).unwrap();
        let err = registry.register(service::<MoaSkinPerk>()).unwrap_err();
        assert!(matches!(err, ServerError::DuplicatePerk("moa_skin")));
    }

    #[test]
    fn frames_reach_the_right_kind() {
        let moa = service::<MoaSkinPerk>();
        let titles = service::<Title>();
        let mut registry = ServerRegistry::new();
        registry.register(moa.clone()).unwrap();
        registry.register(titles.clone()).unwrap();
        assert_eq!(registry.kinds(), vec!["moa_skin", "title"]);

        let (tx, mut rx) = frame_channel();
        registry
            .on_client_connect(ConnectionId::new(1), key(1), Arc::new(tx))
            .unwrap();

        let syncs = rx.drain();
        assert_eq!(syncs.len(), 2);
        for frame in &syncs {
            assert_eq!(
                FrameHeader::peek(frame).unwrap().message_type,
                MessageType::Sync
            );
        }

        let frame = PerkMessage::Apply {
            subject: key(1),
            value: Title {
                text: Some("Sky Captain".into()),
            },
        }
        .encode()
        .unwrap();
        registry.handle_frame(ConnectionId::new(1), &frame).unwrap();

        assert_eq!(titles.record_count(), 1);
        assert_eq!(moa.record_count(), 0);
        assert_eq!(
            FrameHeader::peek(&rx.drain()[0]).unwrap().perk,
            "title".to_string()
        );
    }

    #[test]
    fn unknown_kind_is_a_client_error() {
        let mut registry = ServerRegistry::new();
        registry.register(service::<MoaSkinPerk>()).unwrap();

        let frame = PerkMessage::<Title>::Remove { subject: key(1) }
            .encode()
            .unwrap();
        let err = registry
            .handle_frame(ConnectionId::new(1), &frame)
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownPerk(ref kind) if kind == "title"));
        assert!(err.is_client_error());
    }

    #[test]
    fn checkpoint_counts_written_snapshots() {
        let moa = service::<MoaSkinPerk>();
        let mut registry = ServerRegistry::new();
        registry.register(moa.clone()).unwrap();
        registry.register(service::<Title>()).unwrap();

        moa.handle_apply_request(key(1), key(1), MoaSkinPerk::new(None, MoaSkin::by_id("blue")))
            .unwrap();
        assert_eq!(registry.checkpoint().unwrap(), 1);
        assert_eq!(registry.checkpoint().unwrap(), 0);
    }

    #[test]
    fn departures_fan_out_to_every_kind() {
        let config = ServerConfig::default().with_departure_policy(DeparturePolicy::Purge);
        let identities = Arc::new(StaticIdentities::new());
        let moa = service_with::<MoaSkinPerk>(config.clone(), identities.clone());
        let titles = service_with::<Title>(config, identities);
        let mut registry = ServerRegistry::new();
        registry.register(moa.clone()).unwrap();
        registry.register(titles.clone()).unwrap();

        moa.handle_apply_request(key(1), key(1), MoaSkinPerk::new(None, MoaSkin::by_id("blue")))
            .unwrap();
        titles
            .handle_apply_request(key(1), key(1), title("Sky Captain"))
            .unwrap();
        titles
            .handle_apply_request(key(2), key(2), title("Deckhand"))
            .unwrap();

        assert_eq!(registry.on_user_removed(key(1)).unwrap(), 2);
        assert_eq!(moa.record_count(), 0);
        assert_eq!(titles.record_count(), 1);
        assert_eq!(registry.on_user_removed(key(1)).unwrap(), 0);
    }

    #[test]
    fn revalidation_fans_out_and_sums_removals() {
        let identities = Arc::new(StaticIdentities::new());
        identities.insert(VerificationContext::new(key(1)).with_entitlement("founder"));
        identities.insert(VerificationContext::new(key(2)).with_tier(3));
        let moa = service_with::<MoaSkinPerk>(ServerConfig::default(), identities.clone());
        let titles = service_with::<Title>(ServerConfig::default(), identities.clone());
        let mut registry = ServerRegistry::new();
        registry.register(moa.clone()).unwrap();
        registry.register(titles.clone()).unwrap();

        moa.handle_apply_request(
            key(1),
            key(1),
            MoaSkinPerk::new(None, MoaSkin::by_id("founder")),
        )
        .unwrap();
        moa.handle_apply_request(
            key(2),
            key(2),
            MoaSkinPerk::new(None, MoaSkin::by_id("phoenix")),
        )
        .unwrap();
        titles
            .handle_apply_request(key(1), key(1), title("Sky Captain"))
            .unwrap();
        assert_eq!(registry.revalidate_all().unwrap(), 0);

        identities.remove(key(1));
        identities.remove(key(2));
        assert_eq!(registry.revalidate_all().unwrap(), 2);
        assert_eq!(moa.record_count(), 0);
        assert_eq!(titles.record_count(), 1);
    }
}
