//! # perksync Testkit
//!
//! Test utilities for perksync.
//!
//! This crate provides:
//! - Server fixtures backed by memory or a temporary snapshot file
//! - A recording frame sink for observing what a server sends
//! - Property-based test generators using proptest
//! - Concurrent stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use perksync_testkit::prelude::*;
//!
//! #[test]
//! fn apply_is_broadcast() {
//!     let server = TestServer::memory();
//!     let sink = RecordingSink::new();
//!     server.connect(1, user(1), &sink);
//!     // ... requests
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod sink;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::sink::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use sink::*;
pub use stress::*;
