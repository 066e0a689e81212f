//! Encrypted, append-capped event log.
//!
//! The logger records user-visible events (vault lifecycle, broker access
//! decisions) as an encrypted JSON list in `logs.enc`, sharing the content
//! key the vault store derives on unlock. The key is loaned: the store
//! calls [`EventLogger::set_encryption_key`] after unlock and
//! [`EventLogger::clear_encryption_key`] before wiping its own copy, so no
//! readable log state survives a lock.
//!
//! Messages are masked before they are stored - see [`mask_message`] for
//! the pattern list. The log is capped at [`MAX_LOG_ENTRIES`]; older
//! entries fall off the head. [`EventLogger::archive_logs`] moves old
//! entries into a dated sibling file instead of dropping them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use coffret_crypto_core::{decrypt_json, encrypt_json, mask_value, SecretBytes};
use regex::Regex;

use crate::clock::{epoch_millis, iso8601_days_ago, now_iso8601};
use crate::error::VaultError;
use crate::fsutil::write_file_0600;

/// Maximum number of entries retained in the main log file.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Default `limit` for [`EventLogger::get_filtered_logs`].
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Main log file name inside the vault directory.
const LOG_FILE: &str = "logs.enc";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Application lifecycle (startup, shutdown).
    App,
    /// Broker access decisions.
    Access,
    /// Vault lock/unlock events.
    Lock,
    /// Everything else.
    Info,
}

/// A single log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Event category.
    pub category: LogCategory,
    /// Masked message text.
    pub message: String,
}

/// Aggregate counts returned by [`EventLogger::get_log_stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    /// Total entries currently retained.
    pub total: usize,
    /// Entry counts keyed by category name.
    pub by_category: BTreeMap<String, usize>,
}

struct LoggerState {
    key: Option<SecretBytes<32>>,
    entries: Vec<LogEntry>,
}

/// The encrypted event logger.
pub struct EventLogger {
    vault_dir: PathBuf,
    state: Mutex<LoggerState>,
}

// ---------------------------------------------------------------------------
// Masking
// ---------------------------------------------------------------------------

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"sk-[A-Za-z0-9]{20,}").expect("api key regex is valid")
});

static LONG_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]{32,}").expect("long token regex is valid")
});

static PASSWORD_KV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password\s*[:=]\s*)(\S+)").expect("password regex is valid")
});

static TOKEN_KV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(token\s*[:=]\s*)(\S+)").expect("token regex is valid")
});

/// Mask sensitive substrings in a log message.
///
/// Rules, applied in order:
/// 1. `sk-…` API keys of 20+ characters keep their first 6 characters.
/// 2. Any remaining alphanumeric run of 32+ characters keeps its first 4.
/// 3. `password: <value>` / `password=<value>` becomes `password: ***`.
/// 4. `token: <value>` / `token=<value>` becomes `token: ***`.
#[must_use]
pub fn mask_message(message: &str) -> String {
    let pass1 = API_KEY_RE.replace_all(message, |caps: &regex::Captures<'_>| {
        mask_value(&caps[0], 6)
    });
    let pass2 = LONG_TOKEN_RE.replace_all(&pass1, |caps: &regex::Captures<'_>| {
        mask_value(&caps[0], 4)
    });
    let pass3 = PASSWORD_KV_RE.replace_all(&pass2, "${1}***");
    let pass4 = TOKEN_KV_RE.replace_all(&pass3, "${1}***");
    pass4.into_owned()
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

impl EventLogger {
    /// Create a logger for the given vault directory. No key is set; writes
    /// are dropped until [`EventLogger::set_encryption_key`] is called.
    #[must_use]
    pub fn new(vault_dir: &Path) -> Self {
        Self {
            vault_dir: vault_dir.to_path_buf(),
            state: Mutex::new(LoggerState {
                key: None,
                entries: Vec::new(),
            }),
        }
    }

    /// Install the content key and load any existing log file.
    ///
    /// A log file that fails to decrypt (tampered, or written under a
    /// different key) is discarded with a warning rather than bricking
    /// the session.
    pub fn set_encryption_key(&self, key: SecretBytes<32>) {
        let mut state = self.lock_state();
        let path = self.vault_dir.join(LOG_FILE);
        state.entries = match std::fs::read(&path) {
            Ok(bytes) => match decrypt_json::<Vec<LogEntry>>(&bytes, &key) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(error = %e, "existing log file unreadable, starting fresh");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        state.key = Some(key);
    }

    /// Drop the loaned key and the decrypted in-memory entries.
    pub fn clear_encryption_key(&self) {
        let mut state = self.lock_state();
        state.key = None;
        state.entries.clear();
    }

    /// Record an event. Masks the message, appends, truncates to the last
    /// [`MAX_LOG_ENTRIES`], and persists the encrypted file.
    ///
    /// Without a key the event is dropped with a warning. Persistence
    /// failures are warned about but never surface to the caller.
    pub fn log(&self, message: &str, category: LogCategory) {
        let mut state = self.lock_state();
        if state.key.is_none() {
            tracing::warn!("event log write dropped: no encryption key set");
            return;
        }

        state.entries.push(LogEntry {
            timestamp: now_iso8601(),
            category,
            message: mask_message(message),
        });
        let excess = state.entries.len().saturating_sub(MAX_LOG_ENTRIES);
        if excess > 0 {
            state.entries.drain(..excess);
        }

        self.persist(&state);
    }

    /// Record a broker access decision, listing the affected keys.
    pub fn log_access(&self, action: &str, project: &str, keys: &[String]) {
        self.log(
            &format!("{action}: {project} ({})", keys.join(", ")),
            LogCategory::Access,
        );
    }

    /// Record an application lifecycle event.
    pub fn log_app(&self, event: &str) {
        self.log(event, LogCategory::App);
    }

    /// Record a lock/unlock event.
    pub fn log_lock(&self, event: &str) {
        self.log(event, LogCategory::Lock);
    }

    /// All retained entries in chronological order. Empty when no key is set.
    #[must_use]
    pub fn get_logs(&self) -> Vec<LogEntry> {
        let state = self.lock_state();
        if state.key.is_none() {
            return Vec::new();
        }
        state.entries.clone()
    }

    /// The most recent entries first, optionally filtered by category.
    #[must_use]
    pub fn get_filtered_logs(&self, category: Option<LogCategory>, limit: usize) -> Vec<LogEntry> {
        let state = self.lock_state();
        if state.key.is_none() {
            return Vec::new();
        }
        state
            .entries
            .iter()
            .rev()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Totals and per-category counts.
    #[must_use]
    pub fn get_log_stats(&self) -> LogStats {
        let state = self.lock_state();
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        if state.key.is_some() {
            for entry in &state.entries {
                let name = match entry.category {
                    LogCategory::App => "app",
                    LogCategory::Access => "access",
                    LogCategory::Lock => "lock",
                    LogCategory::Info => "info",
                };
                let counter = by_category.entry(name.to_string()).or_insert(0);
                *counter = counter.saturating_add(1);
            }
        }
        LogStats {
            total: by_category.values().sum(),
            by_category,
        }
    }

    /// Remove the log file and forget retained entries.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, except for a missing file, which
    /// is not an error.
    pub fn clear_logs(&self) -> Result<(), VaultError> {
        let mut state = self.lock_state();
        state.entries.clear();
        match std::fs::remove_file(self.vault_dir.join(LOG_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::Io(e)),
        }
    }

    /// Move entries older than `days_to_keep` days into a dated archive
    /// file (`logs_archive_<epoch-ms>.enc`). Returns the archive path, or
    /// `None` when there was nothing to archive (or no key is set).
    ///
    /// # Errors
    ///
    /// Returns encryption or I/O errors from writing either file.
    pub fn archive_logs(&self, days_to_keep: u64) -> Result<Option<PathBuf>, VaultError> {
        let mut state = self.lock_state();
        let Some(key) = state.key.clone() else {
            tracing::warn!("log archival skipped: no encryption key set");
            return Ok(None);
        };

        let cutoff = iso8601_days_ago(days_to_keep);
        let split = state.entries.partition_point(|e| e.timestamp < cutoff);
        if split == 0 {
            return Ok(None);
        }

        let old: Vec<LogEntry> = state.entries.drain(..split).collect();
        let archive_path = self
            .vault_dir
            .join(format!("logs_archive_{}.enc", epoch_millis()));
        let envelope = encrypt_json(&old, &key)?;
        write_file_0600(&archive_path, &envelope)?;

        self.persist(&state);
        Ok(Some(archive_path))
    }

    /// Encrypt and write the current entry list. Failures are warned, not
    /// returned - logging must never disturb the operation being logged.
    fn persist(&self, state: &LoggerState) {
        let Some(key) = state.key.as_ref() else {
            return;
        };
        let path = self.vault_dir.join(LOG_FILE);
        match encrypt_json(&state.entries, key) {
            Ok(envelope) => {
                if let Err(e) = write_file_0600(&path, &envelope) {
                    tracing::warn!(error = %e, "event log write failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "event log encryption failed"),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LoggerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
