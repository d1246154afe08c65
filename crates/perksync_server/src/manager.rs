//! The authoritative replication manager.

use crate::config::{DeparturePolicy, ServerConfig};
use crate::connections::{ConnectionId, ConnectionRegistry};
use crate::error::{ServerError, ServerResult};
use crate::stats::{ReplicationStats, StatsSnapshot};
use bytes::Bytes;
use parking_lot::Mutex;
use perksync_protocol::{
    needs_update, FrameSink, IdentityProvider, MessageType, Perk, PerkMessage, UserKey,
    VerificationGate,
};
use perksync_store::{PersistenceProvider, RecordStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of an Apply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The store changed and the new value was broadcast.
    Accepted,
    /// The candidate equals the stored value; nothing happened.
    Unchanged,
    /// The verification gate refused the candidate; nothing happened.
    Ineligible,
    /// The requester may not change the subject's record.
    Unauthorized,
}

/// Result of a Remove request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The record was deleted and the removal was broadcast.
    Removed,
    /// There was no record to delete.
    Absent,
    /// The requester may not change the subject's record.
    Unauthorized,
}

/// Owns the authoritative records of one payload type.
///
/// # Ordering
///
/// Accepted changes are broadcast while the subject's store lock is held,
/// so every client receives the changes to one subject in the order the
/// store applied them. A connecting client is registered while the whole
/// store is read-locked, so its Sync reflects exactly the changes made
/// before it and every later change reaches it as a broadcast.
///
/// # Rejections
///
/// Ineligible and unauthorized requests are dropped without a reply. The
/// outcome is only reported to the local caller and counted in the stats.
pub struct ServerReplicationManager<T: Perk> {
    config: ServerConfig,
    store: RecordStore<T>,
    gate: Arc<dyn VerificationGate<T>>,
    identities: Arc<dyn IdentityProvider>,
    persistence: Arc<dyn PersistenceProvider<T>>,
    connections: ConnectionRegistry,
    stats: ReplicationStats,
    dirty: AtomicBool,
    checkpoint_lock: Mutex<()>,
}

impl<T: Perk> ServerReplicationManager<T> {
    /// Creates a manager with an empty store.
    ///
    /// Call [`load`](Self::load) before accepting connections to restore
    /// persisted records.
    pub fn new(
        config: ServerConfig,
        gate: Arc<dyn VerificationGate<T>>,
        identities: Arc<dyn IdentityProvider>,
        persistence: Arc<dyn PersistenceProvider<T>>,
    ) -> Self {
        let store = RecordStore::with_shards(config.shard_count);
        Self {
            config,
            store,
            gate,
            identities,
            persistence,
            connections: ConnectionRegistry::default(),
            stats: ReplicationStats::new(),
            dirty: AtomicBool::new(false),
            checkpoint_lock: Mutex::new(()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Replaces the store with the persisted records.
    ///
    /// With `revalidate_on_load`, records that no longer pass the gate are
    /// dropped. Returns the number of records kept.
    pub fn load(&self) -> ServerResult<usize> {
        let mut records = self.persistence.load()?;
        let total = records.len();

        if self.config.revalidate_on_load {
            records.retain(|subject, value| {
                let context = self.identities.context(*subject);
                self.gate.is_eligible(&context, value)
            });
        }

        let dropped = total - records.len();
        if dropped > 0 {
            warn!(kind = T::KIND, dropped, "dropped ineligible records on load");
            self.stats.record_revalidated_out(dropped as u64);
            self.dirty.store(true, Ordering::SeqCst);
        }

        let kept = records.len();
        self.store.replace_all(records);
        info!(kind = T::KIND, records = kept, "records loaded");
        Ok(kept)
    }

    /// Handles a request to upsert `subject`'s record.
    pub fn handle_apply_request(
        &self,
        requester: UserKey,
        subject: UserKey,
        candidate: T,
    ) -> ServerResult<ApplyOutcome> {
        if !self.config.is_authorized(requester, subject) {
            debug!(kind = T::KIND, %requester, %subject, "dropping unauthorized apply");
            self.stats.record_unauthorized();
            return Ok(ApplyOutcome::Unauthorized);
        }

        let context = self.identities.context(subject);
        if !self.gate.is_eligible(&context, &candidate) {
            debug!(kind = T::KIND, %subject, "dropping ineligible apply");
            self.stats.record_apply_ineligible();
            return Ok(ApplyOutcome::Ineligible);
        }

        let changed = self.store.update(subject, |slot| -> ServerResult<bool> {
            if !needs_update(slot.as_ref(), Some(&candidate)) {
                return Ok(false);
            }
            let frame = PerkMessage::Apply {
                subject,
                value: candidate.clone(),
            }
            .encode()?;
            *slot = Some(candidate);
            self.broadcast(&frame);
            Ok(true)
        })?;

        if changed {
            self.dirty.store(true, Ordering::SeqCst);
            self.stats.record_apply_accepted();
            debug!(kind = T::KIND, %subject, "apply accepted");
            Ok(ApplyOutcome::Accepted)
        } else {
            self.stats.record_apply_unchanged();
            Ok(ApplyOutcome::Unchanged)
        }
    }

    /// Handles a request to delete `subject`'s record.
    pub fn handle_remove_request(
        &self,
        requester: UserKey,
        subject: UserKey,
    ) -> ServerResult<RemoveOutcome> {
        if !self.config.is_authorized(requester, subject) {
            debug!(kind = T::KIND, %requester, %subject, "dropping unauthorized remove");
            self.stats.record_unauthorized();
            return Ok(RemoveOutcome::Unauthorized);
        }

        if self.remove_and_broadcast(subject, |_| true)? {
            self.stats.record_removed();
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::Absent)
        }
    }

    /// Deletes `subject`'s record if `condition` holds for it, broadcasting
    /// the removal under the subject's lock.
    fn remove_and_broadcast(
        &self,
        subject: UserKey,
        condition: impl FnOnce(&T) -> bool,
    ) -> ServerResult<bool> {
        let removed = self.store.update(subject, |slot| -> ServerResult<bool> {
            if !slot.as_ref().is_some_and(condition) {
                return Ok(false);
            }
            let frame = PerkMessage::<T>::Remove { subject }.encode()?;
            *slot = None;
            self.broadcast(&frame);
            Ok(true)
        })?;

        if removed {
            self.dirty.store(true, Ordering::SeqCst);
            debug!(kind = T::KIND, %subject, "record removed");
        }
        Ok(removed)
    }

    fn broadcast(&self, frame: &Bytes) {
        let delivered = self.connections.broadcast(frame);
        self.stats.record_broadcast(delivered as u64);
    }

    /// Registers a client and sends it exactly one Sync.
    ///
    /// The client is only registered if the Sync was handed to its sink.
    pub fn on_client_connect(
        &self,
        connection: ConnectionId,
        user: UserKey,
        sink: Arc<dyn FrameSink>,
    ) -> ServerResult<()> {
        let records = self.store.snapshot_with(|records| -> ServerResult<usize> {
            let count = records.len();
            let frame = PerkMessage::Sync { records }.encode()?;
            sink.send(frame)?;
            self.connections.register(connection, user, Arc::clone(&sink));
            Ok(count)
        })?;

        self.stats.record_sync();
        info!(kind = T::KIND, %connection, %user, records, "client synced");
        Ok(())
    }

    /// Forgets a client. Its user's record is kept.
    ///
    /// Returns false if the connection was unknown.
    pub fn on_client_disconnect(&self, connection: ConnectionId) -> bool {
        let known = self.connections.unregister(connection);
        if known {
            debug!(kind = T::KIND, %connection, "client disconnected");
        }
        known
    }

    /// Applies the departure policy to a user who left for good.
    ///
    /// Returns true if a record was purged.
    pub fn on_user_removed(&self, subject: UserKey) -> ServerResult<bool> {
        match self.config.departure_policy {
            DeparturePolicy::Retain => Ok(false),
            DeparturePolicy::Purge => {
                let purged = self.remove_and_broadcast(subject, |_| true)?;
                if purged {
                    self.stats.record_removed();
                    info!(kind = T::KIND, %subject, "purged departed user");
                }
                Ok(purged)
            }
        }
    }

    /// Re-checks `subject`'s record against the gate and removes it if the
    /// user lost eligibility.
    pub fn revalidate(&self, subject: UserKey) -> ServerResult<bool> {
        let context = self.identities.context(subject);
        let removed =
            self.remove_and_broadcast(subject, |value| !self.gate.is_eligible(&context, value))?;
        if removed {
            self.stats.record_revalidated_out(1);
            info!(kind = T::KIND, %subject, "record failed revalidation");
        }
        Ok(removed)
    }

    /// Re-checks every record. Returns the number removed.
    pub fn revalidate_all(&self) -> ServerResult<usize> {
        let mut removed = 0;
        for subject in self.store.keys() {
            if self.revalidate(subject)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Saves the store if it changed since the last checkpoint.
    ///
    /// Returns true if a snapshot was written. Concurrent callers are
    /// serialized so an older snapshot never overwrites a newer one.
    pub fn checkpoint(&self) -> ServerResult<bool> {
        let _guard = self.checkpoint_lock.lock();
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let records = self.store.snapshot();
        if let Err(e) = self.persistence.save(&records) {
            self.dirty.store(true, Ordering::SeqCst);
            warn!(kind = T::KIND, error = %e, "checkpoint failed");
            return Err(e.into());
        }

        self.stats.record_checkpoint();
        debug!(kind = T::KIND, records = records.len(), "checkpoint written");
        Ok(true)
    }

    /// Decodes and handles a frame received on `connection`.
    ///
    /// The requester is the user the connection was registered with.
    pub fn handle_frame(&self, connection: ConnectionId, frame: &[u8]) -> ServerResult<()> {
        let requester = self
            .connections
            .user(connection)
            .ok_or(ServerError::UnknownConnection(connection))?;

        let message = match PerkMessage::<T>::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(kind = T::KIND, %connection, error = %e, "discarding malformed frame");
                self.stats.record_malformed();
                return Err(e.into());
            }
        };

        match message {
            PerkMessage::Apply { subject, value } => {
                self.handle_apply_request(requester, subject, value)?;
            }
            PerkMessage::Remove { subject } => {
                self.handle_remove_request(requester, subject)?;
            }
            PerkMessage::Sync { .. } => {
                warn!(kind = T::KIND, %connection, "client sent a sync");
                return Err(ServerError::UnexpectedMessage(MessageType::Sync));
            }
        }
        Ok(())
    }

    /// Returns the stored record of `subject`.
    pub fn get(&self, subject: &UserKey) -> Option<T> {
        self.store.get(subject)
    }

    /// Returns a copy of every stored record.
    pub fn snapshot(&self) -> HashMap<UserKey, T> {
        self.store.snapshot()
    }

    /// Returns the number of stored records.
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    /// Returns the number of registered clients.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if there are changes no checkpoint has saved yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perksync_protocol::{
        frame_channel, FrameReceiver, MoaSkin, MoaSkinPerk, PerkGate, StaticIdentities,
        VerificationContext,
    };
    use perksync_store::{MemoryPersistence, StoreResult};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(n: u8) -> UserKey {
        UserKey::from_bytes([n; 16])
    }

    fn perk(skin: &str) -> MoaSkinPerk {
        MoaSkinPerk::new(None, MoaSkin::by_id(skin))
    }

    struct Fixture {
        manager: ServerReplicationManager<MoaSkinPerk>,
        identities: Arc<StaticIdentities>,
        persistence: Arc<MemoryPersistence<MoaSkinPerk>>,
    }

    fn fixture(config: ServerConfig) -> Fixture {
        let identities = Arc::new(StaticIdentities::new());
        let persistence = Arc::new(MemoryPersistence::new());
        let manager = ServerReplicationManager::<MoaSkinPerk>::new(
            config,
            Arc::new(PerkGate),
            identities.clone(),
            persistence.clone(),
        );
        Fixture {
            manager,
            identities,
            persistence,
        }
    }

    fn connect(
        manager: &ServerReplicationManager<MoaSkinPerk>,
        id: u64,
        user: UserKey,
    ) -> FrameReceiver {
        let (tx, rx) = frame_channel();
        manager
            .on_client_connect(ConnectionId::new(id), user, Arc::new(tx))
            .unwrap();
        rx
    }

    fn decode_all(rx: &mut FrameReceiver) -> Vec<PerkMessage<MoaSkinPerk>> {
        rx.drain()
            .iter()
            .map(|frame| PerkMessage::decode(frame).unwrap())
            .collect()
    }

    #[test]
    fn accepted_apply_is_broadcast_to_everyone() {
        let f = fixture(ServerConfig::default());
        let mut a = connect(&f.manager, 1, key(1));
        let mut b = connect(&f.manager, 2, key(2));
        decode_all(&mut a);
        decode_all(&mut b);

        let outcome = f
            .manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Accepted);
        assert_eq!(f.manager.get(&key(1)), Some(perk("blue")));

        let expected = PerkMessage::Apply {
            subject: key(1),
            value: perk("blue"),
        };
        assert_eq!(decode_all(&mut a), vec![expected.clone()]);
        assert_eq!(decode_all(&mut b), vec![expected]);
    }

    #[test]
    fn unchanged_apply_is_not_broadcast() {
        let f = fixture(ServerConfig::default());
        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        let mut rx = connect(&f.manager, 1, key(2));
        decode_all(&mut rx);

        let outcome = f
            .manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(rx.drain().is_empty());
        assert_eq!(f.manager.stats().applies_unchanged, 1);
    }

    #[test]
    fn ineligible_apply_is_dropped_silently() {
        let f = fixture(ServerConfig::default());
        let mut rx = connect(&f.manager, 1, key(1));
        decode_all(&mut rx);

        let outcome = f
            .manager
            .handle_apply_request(key(1), key(1), perk("founder"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Ineligible);
        assert!(f.manager.get(&key(1)).is_none());
        assert!(rx.drain().is_empty());
        assert_eq!(f.manager.stats().applies_ineligible, 1);
    }

    #[test]
    fn eligibility_uses_the_subjects_context() {
        let f = fixture(ServerConfig::default());
        f.identities
            .insert(VerificationContext::new(key(1)).with_tier(3));

        let outcome = f
            .manager
            .handle_apply_request(key(1), key(1), perk("phoenix"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Accepted);
    }

    #[test]
    fn users_cannot_touch_other_records() {
        let f = fixture(ServerConfig::default());
        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();

        let apply = f
            .manager
            .handle_apply_request(key(2), key(1), perk("black"))
            .unwrap();
        let remove = f.manager.handle_remove_request(key(2), key(1)).unwrap();

        assert_eq!(apply, ApplyOutcome::Unauthorized);
        assert_eq!(remove, RemoveOutcome::Unauthorized);
        assert_eq!(f.manager.get(&key(1)), Some(perk("blue")));
        assert_eq!(f.manager.stats().requests_unauthorized, 2);
    }

    #[test]
    fn operators_may_touch_any_record() {
        let admin = key(9);
        let f = fixture(ServerConfig::default().with_operator(admin));
        let outcome = f
            .manager
            .handle_apply_request(admin, key(1), perk("white"))
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Accepted);
        assert_eq!(
            f.manager.handle_remove_request(admin, key(1)).unwrap(),
            RemoveOutcome::Removed
        );
    }

    #[test]
    fn remove_is_broadcast_once() {
        let f = fixture(ServerConfig::default());
        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        let mut rx = connect(&f.manager, 1, key(2));
        decode_all(&mut rx);

        assert_eq!(
            f.manager.handle_remove_request(key(1), key(1)).unwrap(),
            RemoveOutcome::Removed
        );
        assert_eq!(
            f.manager.handle_remove_request(key(1), key(1)).unwrap(),
            RemoveOutcome::Absent
        );
        assert_eq!(
            decode_all(&mut rx),
            vec![PerkMessage::Remove { subject: key(1) }]
        );
    }

    #[test]
    fn connect_sends_exactly_one_sync() {
        let f = fixture(ServerConfig::default());
        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        f.manager
            .handle_apply_request(key(2), key(2), perk("orange"))
            .unwrap();

        let mut rx = connect(&f.manager, 7, key(3));
        let messages = decode_all(&mut rx);
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            PerkMessage::Sync { records } => assert_eq!(*records, f.manager.snapshot()),
            other => panic!("expected sync, got {other:?}"),
        }
        assert_eq!(f.manager.connection_count(), 1);
        assert_eq!(f.manager.stats().syncs_sent, 1);
    }

    #[test]
    fn connect_to_closed_sink_does_not_register() {
        let f = fixture(ServerConfig::default());
        let (tx, rx) = frame_channel();
        drop(rx);

        let result = f
            .manager
            .on_client_connect(ConnectionId::new(1), key(1), Arc::new(tx));
        assert!(matches!(result, Err(ServerError::Channel(_))));
        assert_eq!(f.manager.connection_count(), 0);
    }

    #[test]
    fn disconnect_keeps_the_record() {
        let f = fixture(ServerConfig::default());
        let _rx = connect(&f.manager, 1, key(1));
        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();

        assert!(f.manager.on_client_disconnect(ConnectionId::new(1)));
        assert!(!f.manager.on_client_disconnect(ConnectionId::new(1)));
        assert_eq!(f.manager.get(&key(1)), Some(perk("blue")));
    }

    #[test]
    fn departure_policy() {
        let retain = fixture(ServerConfig::default());
        retain
            .manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        assert!(!retain.manager.on_user_removed(key(1)).unwrap());
        assert!(retain.manager.get(&key(1)).is_some());

        let purge = fixture(ServerConfig::default().with_departure_policy(DeparturePolicy::Purge));
        purge
            .manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        let mut rx = connect(&purge.manager, 1, key(2));
        decode_all(&mut rx);

        assert!(purge.manager.on_user_removed(key(1)).unwrap());
        assert!(purge.manager.get(&key(1)).is_none());
        assert_eq!(
            decode_all(&mut rx),
            vec![PerkMessage::Remove { subject: key(1) }]
        );
    }

    #[test]
    fn revalidation_removes_lost_entitlements() {
        let f = fixture(ServerConfig::default());
        f.identities
            .insert(VerificationContext::new(key(1)).with_entitlement("founder"));
        f.manager
            .handle_apply_request(key(1), key(1), perk("founder"))
            .unwrap();
        f.manager
            .handle_apply_request(key(2), key(2), perk("blue"))
            .unwrap();

        assert_eq!(f.manager.revalidate_all().unwrap(), 0);

        f.identities.remove(key(1));
        assert_eq!(f.manager.revalidate_all().unwrap(), 1);
        assert!(f.manager.get(&key(1)).is_none());
        assert!(f.manager.get(&key(2)).is_some());
        assert_eq!(f.manager.stats().records_revalidated_out, 1);
    }

    #[test]
    fn load_drops_ineligible_records() {
        let stored: HashMap<_, _> = [(key(1), perk("blue")), (key(2), perk("developer"))]
            .into_iter()
            .collect();
        let identities = Arc::new(StaticIdentities::new());
        let persistence = Arc::new(MemoryPersistence::with_records(stored));
        let manager = ServerReplicationManager::<MoaSkinPerk>::new(
            ServerConfig::default(),
            Arc::new(PerkGate),
            identities,
            persistence,
        );

        assert_eq!(manager.load().unwrap(), 1);
        assert!(manager.get(&key(2)).is_none());
        assert!(manager.is_dirty());
    }

    #[test]
    fn load_without_revalidation_keeps_everything() {
        let stored: HashMap<_, _> = [(key(2), perk("developer"))].into_iter().collect();
        let manager = ServerReplicationManager::<MoaSkinPerk>::new(
            ServerConfig::default().with_revalidate_on_load(false),
            Arc::new(PerkGate),
            Arc::new(StaticIdentities::new()),
            Arc::new(MemoryPersistence::with_records(stored)),
        );

        assert_eq!(manager.load().unwrap(), 1);
        assert!(!manager.is_dirty());
    }

    #[test]
    fn checkpoint_saves_only_when_dirty() {
        let f = fixture(ServerConfig::default());
        assert!(!f.manager.checkpoint().unwrap());

        f.manager
            .handle_apply_request(key(1), key(1), perk("blue"))
            .unwrap();
        assert!(f.manager.checkpoint().unwrap());
        assert!(!f.manager.checkpoint().unwrap());

        assert_eq!(f.persistence.save_count(), 1);
        assert_eq!(f.persistence.records(), f.manager.snapshot());
    }

    /// Counts how many saves overlap.
    #[derive(Default)]
    struct SlowPersistence {
        inner: MemoryPersistence<MoaSkinPerk>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PersistenceProvider<MoaSkinPerk> for SlowPersistence {
        fn load(&self) -> StoreResult<HashMap<UserKey, MoaSkinPerk>> {
            self.inner.load()
        }

        fn save(&self, records: &HashMap<UserKey, MoaSkinPerk>) -> StoreResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            let result = self.inner.save(records);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[test]
    fn concurrent_checkpoints_never_overlap() {
        let persistence = Arc::new(SlowPersistence::default());
        let manager = ServerReplicationManager::<MoaSkinPerk>::new(
            ServerConfig::default(),
            Arc::new(PerkGate),
            Arc::new(StaticIdentities::new()),
            persistence.clone(),
        );

        std::thread::scope(|scope| {
            for n in 1..=4u8 {
                let manager = &manager;
                scope.spawn(move || {
                    for skin in ["white", "blue", "orange"] {
                        manager
                            .handle_apply_request(key(n), key(n), perk(skin))
                            .unwrap();
                        manager.checkpoint().unwrap();
                    }
                });
            }
        });
        manager.checkpoint().unwrap();

        assert_eq!(persistence.peak.load(Ordering::SeqCst), 1);
        assert!(!manager.is_dirty());
        assert_eq!(persistence.inner.records(), manager.snapshot());
    }

    #[test]
    fn frames_are_attributed_to_the_connection_user() {
        let f = fixture(ServerConfig::default());
        let _rx = connect(&f.manager, 1, key(1));

        let own = PerkMessage::Apply {
            subject: key(1),
            value: perk("white"),
        }
        .encode()
        .unwrap();
        let foreign = PerkMessage::Apply {
            subject: key(2),
            value: perk("white"),
        }
        .encode()
        .unwrap();

        f.manager.handle_frame(ConnectionId::new(1), &own).unwrap();
        f.manager
            .handle_frame(ConnectionId::new(1), &foreign)
            .unwrap();

        assert_eq!(f.manager.get(&key(1)), Some(perk("white")));
        assert!(f.manager.get(&key(2)).is_none());
    }

    #[test]
    fn bad_frames_are_client_errors() {
        let f = fixture(ServerConfig::default());
        let _rx = connect(&f.manager, 1, key(1));

        let err = f
            .manager
            .handle_frame(ConnectionId::new(1), b"\xa2\x61")
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(f.manager.stats().malformed_frames, 1);

        let sync = PerkMessage::<MoaSkinPerk>::Sync {
            records: HashMap::new(),
        }
        .encode()
        .unwrap();
        let err = f
            .manager
            .handle_frame(ConnectionId::new(1), &sync)
            .unwrap_err();
        assert!(matches!(err, ServerError::UnexpectedMessage(_)));

        let err = f
            .manager
            .handle_frame(ConnectionId::new(2), &sync)
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownConnection(_)));
    }
}
