//! Snapshot persistence.
//!
//! The server loads its records once at startup and saves whole snapshots at
//! durability checkpoints. Providers treat the records as an opaque map keyed
//! by [`UserKey`].

use crate::error::{StoreError, StoreResult};
use ciborium::Value;
use fs2::FileExt;
use parking_lot::RwLock;
use perksync_protocol::codec::{self, expect_map, required_field, text_field, text_map, u16_field};
use perksync_protocol::{decode_records, encode_records, Perk, UserKey, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Durable storage for the server's records.
///
/// # Invariants
///
/// - `load` returns exactly the records passed to the last successful `save`
/// - A failed `save` leaves the previously saved snapshot intact
pub trait PersistenceProvider<T>: Send + Sync {
    /// Loads every persisted record. An empty store loads as an empty map.
    fn load(&self) -> StoreResult<HashMap<UserKey, T>>;

    /// Replaces the persisted records with `records`.
    fn save(&self, records: &HashMap<UserKey, T>) -> StoreResult<()>;
}

/// An in-memory provider for tests and ephemeral servers.
#[derive(Debug)]
pub struct MemoryPersistence<T> {
    records: RwLock<HashMap<UserKey, T>>,
    saves: AtomicUsize,
}

impl<T: Clone> MemoryPersistence<T> {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::with_records(HashMap::new())
    }

    /// Creates a provider that loads `records`.
    pub fn with_records(records: HashMap<UserKey, T>) -> Self {
        Self {
            records: RwLock::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    /// Returns the last saved records.
    pub fn records(&self) -> HashMap<UserKey, T> {
        self.records.read().clone()
    }

    /// Returns how many times `save` was called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl<T: Clone> Default for MemoryPersistence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> PersistenceProvider<T> for MemoryPersistence<T> {
    fn load(&self) -> StoreResult<HashMap<UserKey, T>> {
        Ok(self.records.read().clone())
    }

    fn save(&self, records: &HashMap<UserKey, T>) -> StoreResult<()> {
        *self.records.write() = records.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A provider that keeps one CBOR snapshot file per payload kind.
///
/// # Durability
///
/// `save` writes the snapshot to a sibling temporary file, syncs it and
/// renames it over the target, so readers see either the old or the new
/// snapshot and never a torn one. Concurrent savers are serialized with an
/// exclusive lock on a sibling `.lock` file.
///
/// # Format
///
/// A CBOR map `{ v, perk, records }` where `records` uses the same
/// `[subject, value]` pair encoding as a Sync frame.
#[derive(Debug)]
pub struct FilePersistence<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Perk> FilePersistence<T> {
    /// Creates a provider for the snapshot at `path`.
    ///
    /// Nothing is touched on disk until the first `load` or `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    fn lock(&self) -> StoreResult<File> {
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.sibling("lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Decodes snapshot bytes.
    pub fn decode_snapshot(bytes: &[u8]) -> StoreResult<HashMap<UserKey, T>> {
        let value = codec::from_cbor(bytes)?;
        let map = expect_map(&value)?;

        let version = u16_field(map, "v")?;
        if version != PROTOCOL_VERSION {
            return Err(StoreError::Corrupted(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let kind = text_field(map, "perk")?;
        if kind != T::KIND {
            return Err(StoreError::Corrupted(format!(
                "snapshot holds {kind} records, expected {}",
                T::KIND
            )));
        }

        Ok(decode_records(required_field(map, "records")?)?)
    }

    /// Encodes records as snapshot bytes.
    pub fn encode_snapshot(records: &HashMap<UserKey, T>) -> StoreResult<Vec<u8>> {
        let snapshot = text_map(vec![
            ("v", Value::Integer(PROTOCOL_VERSION.into())),
            ("perk", Value::Text(T::KIND.to_string())),
            ("records", encode_records(records)?),
        ]);
        Ok(codec::to_cbor(&snapshot)?)
    }
}

impl<T: Perk> PersistenceProvider<T> for FilePersistence<T> {
    fn load(&self) -> StoreResult<HashMap<UserKey, T>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot yet");
            return Ok(HashMap::new());
        }
        let bytes = fs::read(&self.path)?;
        Self::decode_snapshot(&bytes)
    }

    fn save(&self, records: &HashMap<UserKey, T>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = Self::encode_snapshot(records)?;
        let lock = self.lock()?;

        let tmp = self.sibling("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        lock.unlock()?;
        debug!(path = %self.path.display(), records = records.len(), "snapshot saved");
        Ok(())
    }
}
