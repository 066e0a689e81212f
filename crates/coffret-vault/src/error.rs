//! Vault error types for `coffret-vault`.

use coffret_crypto_core::CryptoError;
use thiserror::Error;

/// Errors produced by vault and logger operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// No vault exists at the configured directory - run setup first.
    #[error("vault is not initialized")]
    NotInitialized,

    /// A vault already exists at the configured directory.
    #[error("vault already exists: {0}")]
    AlreadyExists(String),

    /// Vault is locked - the operation requires an unlocked vault.
    #[error("vault is locked")]
    Locked,

    /// Incorrect master password - the vault envelope could not be
    /// authenticated.
    #[error("invalid password")]
    InvalidPassword,

    /// On-disk state is unreadable (bad salt encoding, truncated file).
    #[error("vault data corrupted: {0}")]
    Corrupted(String),

    /// Project not found by name.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Secret not found within a project.
    #[error("secret not found: {project}/{key}")]
    SecretNotFound {
        /// The project that was searched.
        project: String,
        /// The missing secret key.
        key: String,
    },

    /// A project with this name already exists.
    #[error("project already exists: {0}")]
    ProjectExists(String),

    /// History version index out of range.
    #[error("version index {index} out of range (history has {available} entries)")]
    VersionOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of history entries available.
        available: usize,
    },

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
