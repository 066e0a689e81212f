//! The on-disk rendezvous between the broker and its clients.
//!
//! When the access server binds its ephemeral port it publishes
//! `server-info.json` (`{host, port, authToken, pid}`, mode `0600`) in the
//! vault directory. Clients read it to find the port and bearer token.
//! The `pid` makes staleness detectable: a handshake whose process is gone
//! means "server not running", and a live one from another pid stops a
//! second broker from starting against the same vault.

use std::path::Path;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use coffret_vault::fsutil::write_file_0600;

use crate::error::BrokerError;

/// Handshake file name inside the vault directory.
pub const HANDSHAKE_FILE: &str = "server-info.json";

/// The published rendezvous record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Always `localhost`; the server only binds loopback.
    pub host: String,
    /// The ephemeral port the server bound.
    pub port: u16,
    /// Hex-encoded bearer token.
    pub auth_token: String,
    /// Pid of the publishing broker.
    pub pid: u32,
}

impl Handshake {
    /// Build a record for this process.
    #[must_use]
    pub fn for_current_process(port: u16, auth_token: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
            auth_token: auth_token.to_string(),
            pid: std::process::id(),
        }
    }

    /// Write the record to `server-info.json` at mode `0600`.
    ///
    /// # Errors
    ///
    /// Serialization and I/O errors.
    pub fn publish(&self, vault_dir: &Path) -> Result<(), BrokerError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;
        write_file_0600(&vault_dir.join(HANDSHAKE_FILE), &json)?;
        Ok(())
    }

    /// Read the handshake, if one exists. An unreadable or unparsable
    /// file is treated the same as a missing one.
    #[must_use]
    pub fn read(vault_dir: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(vault_dir.join(HANDSHAKE_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Read the handshake and keep it only when its process is alive.
    /// A stale file means "server not running".
    #[must_use]
    pub fn read_live(vault_dir: &Path) -> Option<Self> {
        Self::read(vault_dir).filter(Handshake::is_alive)
    }

    /// Whether the publishing process still exists (signal-0 probe; a
    /// permission error still means the pid is taken).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        let Ok(pid) = i32::try_from(self.pid) else {
            return false;
        };
        match kill(Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    /// Delete the handshake file. Missing is fine.
    ///
    /// # Errors
    ///
    /// I/O errors other than the file already being gone.
    pub fn remove(vault_dir: &Path) -> Result<(), BrokerError> {
        match std::fs::remove_file(vault_dir.join(HANDSHAKE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BrokerError::Io(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn publish_read_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let handshake = Handshake::for_current_process(45123, "deadbeef");
        handshake.publish(dir.path()).expect("publish should succeed");

        let read = Handshake::read(dir.path()).expect("handshake should exist");
        assert_eq!(read.host, "localhost");
        assert_eq!(read.port, 45123);
        assert_eq!(read.auth_token, "deadbeef");
        assert_eq!(read.pid, std::process::id());
    }

    #[test]
    fn serializes_camel_case_fields() {
        let handshake = Handshake::for_current_process(1, "t");
        let json = serde_json::to_string(&handshake).expect("serialize");
        assert!(json.contains("authToken"));
        assert!(!json.contains("auth_token"));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        assert!(Handshake::read(dir.path()).is_none());
        assert!(Handshake::read_live(dir.path()).is_none());
    }

    #[test]
    fn garbage_file_reads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join(HANDSHAKE_FILE), "not json").expect("write");
        assert!(Handshake::read(dir.path()).is_none());
    }

    #[test]
    fn own_pid_is_alive() {
        let handshake = Handshake::for_current_process(1, "t");
        assert!(handshake.is_alive());
    }

    #[test]
    fn dead_pid_makes_handshake_stale() {
        let dir = TempDir::new().expect("tempdir");
        let handshake = Handshake {
            host: "localhost".into(),
            port: 1,
            auth_token: "t".into(),
            // Out of i32 range, so no live process can ever match it.
            pid: u32::MAX,
        };
        handshake.publish(dir.path()).expect("publish should succeed");
        assert!(Handshake::read(dir.path()).is_some());
        assert!(Handshake::read_live(dir.path()).is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        Handshake::for_current_process(1, "t")
            .publish(dir.path())
            .expect("publish should succeed");
        Handshake::remove(dir.path()).expect("remove should succeed");
        Handshake::remove(dir.path()).expect("second remove should succeed");
    }

    #[cfg(unix)]
    #[test]
    fn handshake_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        Handshake::for_current_process(1, "t")
            .publish(dir.path())
            .expect("publish should succeed");
        let mode = std::fs::metadata(dir.path().join(HANDSHAKE_FILE))
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
