//! Session lifecycle: idle auto-lock and the shutdown sequence.
//!
//! The idle timer tracks the last authenticated request (any bearer-valid
//! request counts as activity). A background watcher thread checks every
//! few seconds and locks the vault once the idle window elapses. Locking
//! goes through the normal lock path, so pending debounced saves land
//! before the key is wiped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use coffret_vault::{EventLogger, VaultStore};

use crate::error::BrokerError;
use crate::handshake::Handshake;
use crate::server::AccessServer;

/// Default idle window before the vault auto-locks.
pub const DEFAULT_IDLE_LOCK: Duration = Duration::from_secs(5 * 60);

/// How often the watcher thread re-checks idleness.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Activity tracking
// ---------------------------------------------------------------------------

/// Timestamp of the last user-initiated action, shared with the server.
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
}

impl ActivityTracker {
    /// Start the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Record user activity, resetting the idle countdown.
    pub fn record(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Time elapsed since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map_or(Duration::ZERO, |last| last.elapsed())
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Idle lock watcher
// ---------------------------------------------------------------------------

/// Handle to the background idle-lock watcher.
pub struct IdleLock {
    cancel: Arc<AtomicBool>,
}

impl IdleLock {
    /// Watch `tracker` and lock `vault` after `timeout` of inactivity.
    #[must_use]
    pub fn spawn(vault: VaultStore, tracker: Arc<ActivityTracker>, timeout: Duration) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);

        std::thread::spawn(move || loop {
            std::thread::sleep(IDLE_CHECK_INTERVAL.min(timeout));
            if thread_cancel.load(Ordering::Relaxed) {
                return;
            }
            if vault.is_unlocked() && tracker.idle_for() >= timeout {
                tracing::info!("idle window elapsed, locking vault");
                if let Err(e) = vault.lock(false) {
                    tracing::warn!(error = %e, "idle auto-lock failed");
                }
            }
        });

        Self { cancel }
    }

    /// Stop the watcher (it exits at its next tick).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Orderly shutdown: flush pending writes, record the final `app` log
/// entry, lock synchronously, stop the server, and remove the handshake.
///
/// # Errors
///
/// The first vault or I/O error encountered; later steps still run.
pub async fn shutdown(
    vault: &VaultStore,
    logger: &EventLogger,
    server: AccessServer,
) -> Result<(), BrokerError> {
    let vault_dir = vault.vault_dir().to_path_buf();

    let flush_result = if vault.is_unlocked() {
        logger.log_app("Broker shutting down");
        vault.save_now()
    } else {
        Ok(())
    };
    let lock_result = vault.lock(true);

    server.stop().await;
    Handshake::remove(&vault_dir)?;

    flush_result?;
    lock_result?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_not_idle() {
        let tracker = ActivityTracker::new();
        assert!(tracker.idle_for() < Duration::from_secs(1));
    }

    #[test]
    fn record_resets_idle_clock() {
        let tracker = ActivityTracker::new();
        std::thread::sleep(Duration::from_millis(30));
        tracker.record();
        assert!(tracker.idle_for() < Duration::from_millis(30));
    }

    #[test]
    fn idle_lock_locks_vault_after_timeout() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let vault = VaultStore::new(dir.path());
        vault.setup("hunter2").expect("setup should succeed");
        assert!(vault.is_unlocked());

        let tracker = Arc::new(ActivityTracker::new());
        let watcher = IdleLock::spawn(
            vault.clone(),
            Arc::clone(&tracker),
            Duration::from_millis(50),
        );

        // The watcher ticks at min(interval, timeout) = 50ms.
        std::thread::sleep(Duration::from_millis(400));
        assert!(!vault.is_unlocked());
        watcher.cancel();
    }

    #[test]
    fn activity_defers_idle_lock() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let vault = VaultStore::new(dir.path());
        vault.setup("hunter2").expect("setup should succeed");

        let tracker = Arc::new(ActivityTracker::new());
        let watcher = IdleLock::spawn(
            vault.clone(),
            Arc::clone(&tracker),
            Duration::from_millis(300),
        );

        // Keep touching the tracker more often than the timeout.
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(100));
            tracker.record();
        }
        assert!(vault.is_unlocked());
        watcher.cancel();
    }
}
