//! `coffret-vault` - Vault business logic for Coffret.
//!
//! Manages the encrypted projects/secrets document, its lock/unlock
//! lifecycle with debounced persistence, and the encrypted event log that
//! shares the vault's content key.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clock;
pub mod document;
pub mod error;
pub mod fsutil;

pub mod store;

pub mod logger;

pub use document::{
    Favorites, HistoryEntry, Project, Secret, SecretRecord, VaultDocument, DOCUMENT_VERSION,
    MAX_HISTORY,
};
pub use error::VaultError;
pub use logger::{
    mask_message, EventLogger, LogCategory, LogEntry, LogStats, DEFAULT_LOG_LIMIT,
    MAX_LOG_ENTRIES,
};
pub use store::{
    ProjectSummary, SecretHistory, SecretVersion, SecretView, VaultStatistics, VaultStore,
    SALT_FILE, VAULT_FILE,
};
