//! The client mirror and reconciliation.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use parking_lot::RwLock;
use perksync_protocol::{needs_update, FrameSink, Perk, PerkMessage, UserKey, VerificationGate};
use perksync_store::RecordStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Supplies what the local side wants a user's record to be.
pub trait DesiredStateSource<T>: Send + Sync {
    /// Returns the wanted record, or `None` if the user wants no record.
    fn desired_state(&self, user: UserKey) -> Option<T>;
}

impl<T, F> DesiredStateSource<T> for F
where
    F: Fn(UserKey) -> Option<T> + Send + Sync,
{
    fn desired_state(&self, user: UserKey) -> Option<T> {
        self(user)
    }
}

/// What a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// An Apply request was sent.
    SentApply,
    /// A Remove request was sent.
    SentRemove,
    /// The mirror already shows the desired state.
    Unchanged,
    /// The local pre-check predicted the server would drop the Apply.
    SkippedIneligible,
}

/// Mirrors the server's records of one payload kind.
pub struct ClientReplicationManager<T: Perk> {
    config: ClientConfig,
    source: Arc<dyn DesiredStateSource<T>>,
    gate: Arc<dyn VerificationGate<T>>,
    mirror: RecordStore<T>,
    outbound: RwLock<Option<Arc<dyn FrameSink>>>,
    synced: AtomicBool,
}

impl<T: Perk> ClientReplicationManager<T> {
    /// Creates a disconnected manager with an empty mirror.
    pub fn new(
        config: ClientConfig,
        source: Arc<dyn DesiredStateSource<T>>,
        gate: Arc<dyn VerificationGate<T>>,
    ) -> Self {
        Self {
            config,
            source,
            gate,
            mirror: RecordStore::new(),
            outbound: RwLock::new(None),
            synced: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Attaches the sink requests are sent through.
    pub fn connect(&self, sink: Arc<dyn FrameSink>) {
        *self.outbound.write() = Some(sink);
        debug!(kind = T::KIND, "client connected");
    }

    /// Returns true if an open sink is attached.
    pub fn is_connected(&self) -> bool {
        self.outbound
            .read()
            .as_ref()
            .is_some_and(|sink| sink.is_open())
    }

    /// Drops the sink and the mirror.
    ///
    /// The mirror is rebuilt by the Sync of the next connection.
    pub fn on_disconnect(&self) {
        *self.outbound.write() = None;
        self.mirror.clear();
        self.synced.store(false, Ordering::SeqCst);
        info!(kind = T::KIND, "client disconnected; mirror cleared");
    }

    /// Returns what the local side wants `user`'s record to be.
    pub fn desired_state(&self, user: UserKey) -> Option<T> {
        self.source.desired_state(user)
    }

    /// Sends whatever request would bring the server to `user`'s desired
    /// state, if the mirror shows it is not there yet.
    ///
    /// Calling this again before the server answers sends the same request
    /// again; the server treats the duplicate as unchanged.
    pub fn reconcile(&self, user: UserKey) -> ClientResult<ReconcileOutcome> {
        let desired = self.desired_state(user);
        let mirrored = self.mirror.get(&user);

        if !needs_update(mirrored.as_ref(), desired.as_ref()) {
            return Ok(ReconcileOutcome::Unchanged);
        }

        match desired {
            Some(value) => {
                if let Some(context) = &self.config.local_context {
                    if context.user() == user && !self.gate.is_eligible(context, &value) {
                        debug!(kind = T::KIND, %user, "skipping apply the server would drop");
                        return Ok(ReconcileOutcome::SkippedIneligible);
                    }
                }
                self.send(PerkMessage::Apply {
                    subject: user,
                    value,
                })?;
                debug!(kind = T::KIND, %user, "apply requested");
                Ok(ReconcileOutcome::SentApply)
            }
            None => {
                self.send(PerkMessage::Remove { subject: user })?;
                debug!(kind = T::KIND, %user, "remove requested");
                Ok(ReconcileOutcome::SentRemove)
            }
        }
    }

    /// Reconciles the configured local user.
    pub fn reconcile_local(&self) -> ClientResult<ReconcileOutcome> {
        self.reconcile(self.config.local_user)
    }

    fn send(&self, message: PerkMessage<T>) -> ClientResult<()> {
        let frame: Bytes = message.encode()?;
        let outbound = self.outbound.read();
        let sink = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        sink.send(frame)?;
        Ok(())
    }

    /// Applies a message from the server to the mirror.
    pub fn apply_inbound(&self, message: PerkMessage<T>) {
        match message {
            PerkMessage::Apply { subject, value } => {
                self.mirror.put(subject, value);
            }
            PerkMessage::Remove { subject } => {
                self.mirror.remove(&subject);
            }
            PerkMessage::Sync { records } => {
                let count = records.len();
                self.mirror.replace_all(records);
                self.synced.store(true, Ordering::SeqCst);
                info!(kind = T::KIND, records = count, "mirror synced");
            }
        }
    }

    /// Decodes a server frame and applies it.
    ///
    /// Malformed frames leave the mirror untouched and are the only error.
    /// After a Sync the local user is reconciled if `reconcile_on_sync` is
    /// set; a failure to send that follow-up request is logged, since the
    /// frame itself was applied.
    pub fn handle_frame(&self, frame: &[u8]) -> ClientResult<()> {
        let message = match PerkMessage::<T>::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(kind = T::KIND, error = %e, "discarding malformed frame");
                return Err(e.into());
            }
        };

        let is_sync = matches!(message, PerkMessage::Sync { .. });
        self.apply_inbound(message);

        if is_sync && self.config.reconcile_on_sync {
            match self.reconcile_local() {
                Ok(outcome) => debug!(kind = T::KIND, ?outcome, "reconciled after sync"),
                Err(e) => warn!(kind = T::KIND, error = %e, "reconcile after sync failed"),
            }
        }
        Ok(())
    }

    /// Returns the mirrored record of `user`.
    pub fn mirror(&self, user: &UserKey) -> Option<T> {
        self.mirror.get(user)
    }

    /// Returns a copy of the whole mirror.
    pub fn mirror_snapshot(&self) -> HashMap<UserKey, T> {
        self.mirror.snapshot()
    }

    /// Returns true once a Sync arrived on the current connection.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}
