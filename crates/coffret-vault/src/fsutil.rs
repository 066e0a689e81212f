//! Filesystem helpers shared by the store and the logger.
//!
//! All persistent files are owner-only (`0600`) and written through a
//! temp-file + rename so a crash mid-write never leaves a truncated
//! vault or log behind.

use std::path::Path;

/// Write `bytes` to `path` atomically with mode `0600`.
///
/// The data lands in a hidden `.<name>.tmp` sibling first, gets its
/// permissions restricted, then replaces the target via `rename`.
///
/// # Errors
///
/// Returns the underlying I/O error from write, chmod, or rename.
pub fn write_file_0600(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vault-write");
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&tmp, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Re-assert `0600` on an existing file (no-op on non-Unix).
///
/// # Errors
///
/// Returns the underlying I/O error from chmod.
pub fn ensure_mode_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
