//! Client configuration.

use perksync_protocol::{UserKey, VerificationContext};

/// Configuration for a client replication manager.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The user this client acts for.
    pub local_user: UserKey,
    /// Facts about the local user, used to skip requests the server would
    /// drop. No pre-check happens when unset.
    pub local_context: Option<VerificationContext>,
    /// Whether a Sync triggers reconciliation of the local user.
    pub reconcile_on_sync: bool,
}

impl ClientConfig {
    /// Creates a configuration for `local_user`.
    pub fn new(local_user: UserKey) -> Self {
        Self {
            local_user,
            local_context: None,
            reconcile_on_sync: true,
        }
    }

    /// Enables the local eligibility pre-check.
    pub fn with_local_context(mut self, context: VerificationContext) -> Self {
        self.local_context = Some(context);
        self
    }

    /// Enables or disables reconciliation after a Sync.
    pub fn with_reconcile_on_sync(mut self, enabled: bool) -> Self {
        self.reconcile_on_sync = enabled;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(UserKey::from_bytes([0u8; 16]))
    }
}
