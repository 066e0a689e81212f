//! Broker error types for `coffret-broker`.

use coffret_vault::VaultError;
use thiserror::Error;

/// Errors produced by the broker layer (server lifecycle, handshake,
/// session management).
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Delegated vault failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// I/O error from the filesystem or the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A live handshake file points at another running broker.
    #[error("another broker instance is already running (pid {0})")]
    AlreadyRunning(u32),

    /// Handshake or configuration JSON could not be produced.
    #[error("serialization error: {0}")]
    Serialization(String),
}
