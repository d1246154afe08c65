//! # perksync Client
//!
//! Client side of the perksync replication protocol.
//!
//! A [`ClientReplicationManager`] keeps a read-only mirror of the server's
//! records for one payload kind and sends requests when the local user's
//! desired state drifts from what the mirror shows.
//!
//! ## Flow
//!
//! 1. [`connect`](ClientReplicationManager::connect) attaches the outbound sink
//! 2. The server's Sync replaces the mirror; the local user is reconciled
//! 3. Broadcasts keep the mirror current
//! 4. Call [`reconcile`](ClientReplicationManager::reconcile) whenever local
//!    preferences change
//!
//! The client never writes its own mirror in response to its own request.
//! Its requests show up in the mirror only once the server broadcasts them.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod manager;
mod preferences;
mod registry;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use manager::{ClientReplicationManager, DesiredStateSource, ReconcileOutcome};
pub use preferences::MoaSkinPreferences;
pub use registry::{ClientRegistry, PerkClient};
