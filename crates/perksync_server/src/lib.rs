//! # perksync Server
//!
//! Authoritative side of the perksync replication protocol.
//!
//! This crate provides:
//! - [`ServerReplicationManager`], one per payload type, owning the
//!   authoritative record store
//! - [`ServerRegistry`], which routes frames to the manager for their kind
//! - [`EventLoop`], an async loop that confines all manager calls to one task
//!
//! # Protocol
//!
//! 1. A client connects and receives exactly one Sync with the full store
//! 2. The client sends Apply or Remove requests for its own records
//! 3. The server checks authorization and the verification gate, and drops
//!    anything that fails without telling the requester
//! 4. Accepted changes update the store and are broadcast to every client
//!
//! # Durability
//!
//! Records are loaded once at startup and saved on checkpoints through a
//! [`PersistenceProvider`](perksync_store::PersistenceProvider).

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod connections;
mod error;
mod event_loop;
mod manager;
mod registry;
mod stats;

pub use config::{DeparturePolicy, ServerConfig};
pub use connections::ConnectionId;
pub use error::{ServerError, ServerResult};
pub use event_loop::{event_channel, EventLoop, InboundEvent};
pub use manager::{ApplyOutcome, RemoveOutcome, ServerReplicationManager};
pub use registry::{PerkService, ServerRegistry};
pub use stats::{ReplicationStats, StatsSnapshot};
