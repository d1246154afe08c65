//! Server fixtures and identity helpers.
//!
//! Provides convenience functions for standing up a replication manager
//! with in-memory or file-backed persistence.

use crate::sink::RecordingSink;
use perksync_protocol::{
    MoaSkin, MoaSkinPerk, PerkGate, StaticIdentities, UserKey, VerificationContext,
};
use perksync_server::{ConnectionId, ServerConfig, ServerReplicationManager};
use perksync_store::{FilePersistence, MemoryPersistence, PersistenceProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Returns a deterministic user key for small test indices.
pub fn user(n: u8) -> UserKey {
    UserKey::from_bytes([n; 16])
}

/// Returns a moa skin record with no moa and the catalog skin `id`.
///
/// # Panics
///
/// Panics if `id` is not in the catalog.
pub fn skin(id: &str) -> MoaSkinPerk {
    let skin = MoaSkin::by_id(id).expect("skin must be in the catalog");
    MoaSkinPerk::new(None, Some(skin))
}

/// A context for a supporter of the given tier.
pub fn patron(user: UserKey, tier: u8) -> VerificationContext {
    VerificationContext::new(user).with_tier(tier)
}

/// A context holding the `founder` entitlement.
pub fn founder(user: UserKey) -> VerificationContext {
    VerificationContext::new(user).with_entitlement("founder")
}

/// A moa skin server with a catalog gate and an editable identity table.
pub struct TestServer {
    /// The manager under test.
    pub manager: Arc<ServerReplicationManager<MoaSkinPerk>>,
    /// Identity table consulted by the gate.
    pub identities: Arc<StaticIdentities>,
    persistence: Arc<dyn PersistenceProvider<MoaSkinPerk>>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a server with in-memory persistence.
    pub fn memory() -> Self {
        Self::memory_with(ServerConfig::default())
    }

    /// Creates a server with in-memory persistence and `config`.
    pub fn memory_with(config: ServerConfig) -> Self {
        Self::build(config, Arc::new(MemoryPersistence::new()), None)
    }

    /// Creates a server that checkpoints to a temporary snapshot file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("moa_skin.cbor");
        Self::build(
            ServerConfig::default(),
            Arc::new(FilePersistence::<MoaSkinPerk>::new(path)),
            Some(temp_dir),
        )
    }

    fn build(
        config: ServerConfig,
        persistence: Arc<dyn PersistenceProvider<MoaSkinPerk>>,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let identities = Arc::new(StaticIdentities::new());
        let manager = Arc::new(ServerReplicationManager::<MoaSkinPerk>::new(
            config,
            Arc::new(PerkGate),
            identities.clone(),
            Arc::clone(&persistence),
        ));
        Self {
            manager,
            identities,
            persistence,
            _temp_dir: temp_dir,
        }
    }

    /// Creates a fresh manager over the same persistence, as after a
    /// restart, and loads it.
    pub fn restart(&self, config: ServerConfig) -> Arc<ServerReplicationManager<MoaSkinPerk>> {
        let manager = Arc::new(ServerReplicationManager::<MoaSkinPerk>::new(
            config,
            Arc::new(PerkGate),
            self.identities.clone(),
            Arc::clone(&self.persistence),
        ));
        manager.load().expect("Failed to load persisted records");
        manager
    }

    /// Returns the snapshot path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("moa_skin.cbor"))
    }

    /// Connects a client whose frames land in `sink`.
    pub fn connect(&self, id: u64, user: UserKey, sink: &RecordingSink) {
        self.manager
            .on_client_connect(ConnectionId::new(id), user, sink.shared())
            .expect("Failed to connect client");
    }
}

impl std::ops::Deref for TestServer {
    type Target = ServerReplicationManager<MoaSkinPerk>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}
