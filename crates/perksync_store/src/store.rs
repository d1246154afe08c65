//! Keyed record store.

use parking_lot::RwLock;
use perksync_protocol::{needs_update, Perk, UserKey};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const DEFAULT_SHARDS: usize = 16;

/// A mapping from [`UserKey`] to a record of type `T`.
///
/// The map is split into shards, each behind its own lock. All operations on
/// one key go through that key's shard, so writers of the same key are
/// serialized while writers of different keys rarely contend.
///
/// # Lock order
///
/// Operations that need several shards ([`snapshot_with`](Self::snapshot_with),
/// [`replace_all`](Self::replace_all)) take them in ascending index order.
/// Closures passed to [`update`](Self::update) and `snapshot_with` may take
/// other locks, but must not call back into the same store.
pub struct RecordStore<T> {
    shards: Box<[RwLock<HashMap<UserKey, T>>]>,
}

impl<T: Clone> RecordStore<T> {
    /// Creates an empty store with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates an empty store with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard_index(&self, key: &UserKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn shard(&self, key: &UserKey) -> &RwLock<HashMap<UserKey, T>> {
        &self.shards[self.shard_index(key)]
    }

    /// Returns a copy of the record for `key`.
    pub fn get(&self, key: &UserKey) -> Option<T> {
        self.shard(key).read().get(key).cloned()
    }

    /// Returns true if `key` has a record.
    pub fn contains(&self, key: &UserKey) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Stores `value` under `key`, returning the previous record.
    pub fn put(&self, key: UserKey, value: T) -> Option<T> {
        self.shard(&key).write().insert(key, value)
    }

    /// Deletes the record for `key`, returning it.
    pub fn remove(&self, key: &UserKey) -> Option<T> {
        self.shard(key).write().remove(key)
    }

    /// Runs `f` over the slot for `key` while holding the key's write lock.
    ///
    /// The slot is `None` when no record exists. Whatever the slot holds when
    /// `f` returns becomes the new state: `Some` stores, `None` deletes.
    pub fn update<R>(&self, key: UserKey, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        let mut shard = self.shard(&key).write();
        let mut slot = shard.remove(&key);
        let result = f(&mut slot);
        if let Some(value) = slot {
            shard.insert(key, value);
        }
        result
    }

    /// Returns a copy of every record.
    pub fn snapshot(&self) -> HashMap<UserKey, T> {
        self.snapshot_with(|records| records)
    }

    /// Takes a snapshot and runs `f` on it before any writer can proceed.
    ///
    /// Every shard stays read-locked until `f` returns, so no mutation can
    /// slip in between the snapshot and whatever `f` does with it.
    pub fn snapshot_with<R>(&self, f: impl FnOnce(HashMap<UserKey, T>) -> R) -> R {
        let guards: Vec<_> = self.shards.iter().map(|shard| shard.read()).collect();
        let records = guards
            .iter()
            .flat_map(|shard| shard.iter().map(|(k, v)| (*k, v.clone())))
            .collect();
        f(records)
    }

    /// Replaces every record with `records`.
    pub fn replace_all(&self, records: HashMap<UserKey, T>) {
        let mut guards: Vec<_> = self.shards.iter().map(|shard| shard.write()).collect();
        for shard in guards.iter_mut() {
            shard.clear();
        }
        for (key, value) in records {
            let index = self.shard_index(&key);
            guards[index].insert(key, value);
        }
    }

    /// Deletes every record.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().clear();
        }
    }

    /// Returns every key currently stored.
    pub fn keys(&self) -> Vec<UserKey> {
        self.shards
            .iter()
            .flat_map(|shard| shard.read().keys().copied().collect::<Vec<_>>())
            .collect()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

impl<T: Perk> RecordStore<T> {
    /// Stores `value` only if it differs from the current record.
    ///
    /// Returns true if the store changed.
    pub fn put_if_changed(&self, key: UserKey, value: T) -> bool {
        self.update(key, |slot| {
            if needs_update(slot.as_ref(), Some(&value)) {
                *slot = Some(value);
                true
            } else {
                false
            }
        })
    }
}

impl<T: Clone> Default for RecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("shards", &self.shards.len())
            .finish()
    }
}
