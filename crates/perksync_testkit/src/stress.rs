//! Concurrent stress helpers.
//!
//! These drive a manager from many threads at once; callers check the
//! replication invariants afterwards.

use crate::fixtures::{skin, user};
use perksync_protocol::MoaSkinPerk;
use perksync_server::ServerReplicationManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Requests issued.
    pub total_ops: usize,
    /// Requests that returned `Ok`.
    pub successful_ops: usize,
    /// Requests that returned an error.
    pub failed_ops: usize,
    /// Wall time.
    pub duration: Duration,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        Self {
            total_ops: successful + failed,
            successful_ops: successful,
            failed_ops: failed,
            duration,
        }
    }

    /// Requests per second.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.total_ops as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Requests issued by each thread.
    pub operations_per_thread: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct users (at most 255).
    pub users: u8,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations_per_thread: 500,
            threads: 4,
            users: 16,
        }
    }
}

/// Skins every user may wear, cycled through by stress writers.
pub const OPEN_SKINS: [&str; 4] = ["blue", "white", "black", "orange"];

/// Runs concurrent self-applies and self-removes against `manager`.
///
/// Every thread touches every user, so writers of the same key contend.
/// Thread `t` ends with an apply of `OPEN_SKINS[t % 4]` for every user.
pub fn stress_concurrent_requests(
    manager: Arc<ServerReplicationManager<MoaSkinPerk>>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let users = config.users.max(1);

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations_per_thread;

            thread::spawn(move || {
                for i in 0..operations {
                    let subject = user((i % users as usize) as u8 + 1);
                    let result = if i % 5 == 4 {
                        manager.handle_remove_request(subject, subject).map(|_| ())
                    } else {
                        let value = skin(OPEN_SKINS[(t + i) % OPEN_SKINS.len()]);
                        manager
                            .handle_apply_request(subject, subject, value)
                            .map(|_| ())
                    };
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
                for n in 0..users {
                    let subject = user(n + 1);
                    let value = skin(OPEN_SKINS[t % OPEN_SKINS.len()]);
                    let _ = manager.handle_apply_request(subject, subject, value);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
