//! Server configuration.

use perksync_protocol::UserKey;
use std::collections::HashSet;

/// What happens to a user's record when the user leaves for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeparturePolicy {
    /// Keep the record; users are persistent identities, not sessions.
    #[default]
    Retain,
    /// Delete the record and broadcast a Remove.
    Purge,
}

/// Configuration for a replication manager.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of lock shards in the record store.
    pub shard_count: usize,
    /// Policy applied by `on_user_removed`.
    pub departure_policy: DeparturePolicy,
    /// Whether loaded records are checked against the gate at startup.
    pub revalidate_on_load: bool,
    /// Users allowed to change records other than their own.
    pub operators: HashSet<UserKey>,
}

impl ServerConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            shard_count: 16,
            departure_policy: DeparturePolicy::Retain,
            revalidate_on_load: true,
            operators: HashSet::new(),
        }
    }

    /// Sets the number of store shards.
    pub fn with_shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Sets the departure policy.
    pub fn with_departure_policy(mut self, policy: DeparturePolicy) -> Self {
        self.departure_policy = policy;
        self
    }

    /// Enables or disables revalidation of loaded records.
    pub fn with_revalidate_on_load(mut self, enabled: bool) -> Self {
        self.revalidate_on_load = enabled;
        self
    }

    /// Grants `user` the right to change every record.
    pub fn with_operator(mut self, user: UserKey) -> Self {
        self.operators.insert(user);
        self
    }

    /// Returns true if `requester` may change `subject`'s record.
    pub fn is_authorized(&self, requester: UserKey, subject: UserKey) -> bool {
        requester == subject || self.operators.contains(&requester)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.shard_count, 16);
        assert_eq!(config.departure_policy, DeparturePolicy::Retain);
        assert!(config.revalidate_on_load);
        assert!(config.operators.is_empty());
    }

    #[test]
    fn config_builder() {
        let admin = UserKey::from_bytes([9u8; 16]);
        let config = ServerConfig::new()
            .with_shard_count(4)
            .with_departure_policy(DeparturePolicy::Purge)
            .with_revalidate_on_load(false)
            .with_operator(admin);

        assert_eq!(config.shard_count, 4);
        assert_eq!(config.departure_policy, DeparturePolicy::Purge);
        assert!(!config.revalidate_on_load);
        assert!(config.operators.contains(&admin));
    }

    #[test]
    fn authorization() {
        let alice = UserKey::from_bytes([1u8; 16]);
        let bob = UserKey::from_bytes([2u8; 16]);
        let admin = UserKey::from_bytes([9u8; 16]);
        let config = ServerConfig::new().with_operator(admin);

        assert!(config.is_authorized(alice, alice));
        assert!(!config.is_authorized(alice, bob));
        assert!(config.is_authorized(admin, bob));
    }
}
