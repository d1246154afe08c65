//! # perksync Store
//!
//! Record storage for perksync.
//!
//! This crate provides:
//! - [`RecordStore`], the keyed `UserKey -> T` map owned by one side
//! - [`PersistenceProvider`], the load/save contract used by the server
//! - [`MemoryPersistence`] for tests and [`FilePersistence`] for durable
//!   CBOR snapshots
//!
//! ## Design Principles
//!
//! - Records are replaced wholesale, never patched
//! - Mutations of one key are serialized by that key's shard lock
//! - Persistence sees whole snapshots only; it does not know about messages

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod persistence;
mod store;

pub use error::{StoreError, StoreResult};
pub use persistence::{FilePersistence, MemoryPersistence, PersistenceProvider};
pub use store::RecordStore;
