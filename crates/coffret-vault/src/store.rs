//! The vault store - encrypted projects and secrets with a lock/unlock
//! lifecycle and debounced persistence.
//!
//! On disk a vault is two files in the vault directory, both `0600`:
//!
//! - `salt.txt` - hex-encoded random Argon2id salt
//! - `vault.enc` - AES-256-GCM envelope of the JSON [`VaultDocument`]
//!
//! The store is a cheap-to-clone handle (`Arc` inside); all state sits
//! behind one mutex, so mutations serialize no matter how many handles
//! exist. Mutating operations arm a 1-second debounce deadline; a
//! background flusher thread persists once the deadline passes, and
//! [`VaultStore::save_now`] or [`VaultStore::lock`] force the write.
//!
//! The derived content key is owned by the store. An attached
//! [`EventLogger`] borrows it for the session: the store installs the key
//! after `setup`/`unlock` and clears it again before wiping its own copy
//! on `lock`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use coffret_crypto_core::{decrypt_json, encrypt_json, kdf, CryptoError, SecretBytes};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Serialize};

use crate::clock::{iso8601_after_days, now_iso8601};
use crate::document::{HistoryEntry, Project, Secret, SecretRecord, VaultDocument, MAX_HISTORY};
use crate::error::VaultError;
use crate::fsutil::{ensure_mode_0600, write_file_0600};
use crate::logger::EventLogger;

/// Salt file name inside the vault directory.
pub const SALT_FILE: &str = "salt.txt";

/// Encrypted document file name inside the vault directory.
pub const VAULT_FILE: &str = "vault.enc";

/// Quiet period after the last mutation before the debounced save fires.
const SAVE_DEBOUNCE: Duration = Duration::from_secs(1);

/// How often the background flusher checks for a due save.
const FLUSH_TICK: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

/// Project listing row - no secret material.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// Project name.
    pub name: String,
    /// Number of secrets in the project.
    pub secret_count: usize,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

/// Read view of a secret. History is intentionally excluded; callers that
/// need it go through [`VaultStore::get_secret_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretView {
    /// The secret value.
    pub value: String,
    /// Optional expiry.
    pub expires_at: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last mutation timestamp.
    pub updated_at: String,
}

/// One version in a secret's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVersion {
    /// The value at this version.
    pub value: String,
    /// The expiry at this version.
    pub expires_at: Option<String>,
    /// When this version was written.
    pub changed_at: String,
    /// Whether this is the live value.
    pub is_current: bool,
}

/// Full version timeline of a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretHistory {
    /// The live value (`is_current = true`).
    pub current: SecretVersion,
    /// Prior values, most recent first.
    pub history: Vec<SecretVersion>,
    /// `1 + history.len()`.
    pub total_versions: usize,
}

/// Aggregate vault statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatistics {
    /// Number of projects.
    pub total_projects: usize,
    /// Number of secrets across all projects.
    pub total_secrets: usize,
    /// Secrets whose expiry falls within the next 7 days (including
    /// already-expired ones).
    pub expiring_secrets: usize,
    /// Whether any secret is already past its expiry.
    pub has_expired: bool,
}

// ---------------------------------------------------------------------------
// Store internals
// ---------------------------------------------------------------------------

/// Unlocked session state. Dropping it zeroizes the key.
struct Session {
    key: SecretBytes<32>,
    document: VaultDocument,
}

struct StoreInner {
    /// `None` = locked.
    session: Option<Session>,
    /// Deadline for the debounced save, armed by mutations.
    save_due: Option<Instant>,
}

struct Shared {
    vault_dir: PathBuf,
    inner: Mutex<StoreInner>,
    logger: Mutex<Option<Arc<EventLogger>>>,
}

/// Handle to the vault store. Clones share the same state.
#[derive(Clone)]
pub struct VaultStore {
    shared: Arc<Shared>,
}

impl VaultStore {
    /// Create a store handle for the given vault directory and start the
    /// background save flusher. The store starts locked; the directory
    /// does not need to exist yet.
    #[must_use]
    pub fn new(vault_dir: &Path) -> Self {
        let shared = Arc::new(Shared {
            vault_dir: vault_dir.to_path_buf(),
            inner: Mutex::new(StoreInner {
                session: None,
                save_due: None,
            }),
            logger: Mutex::new(None),
        });

        let weak = Arc::downgrade(&shared);
        std::thread::spawn(move || flusher_loop(&weak));

        Self { shared }
    }

    /// Attach the event logger that borrows the content key for the
    /// session (installed on unlock, cleared on lock).
    pub fn attach_logger(&self, logger: Arc<EventLogger>) {
        *lock_or_recover(&self.shared.logger) = Some(logger);
    }

    /// The directory holding the vault files.
    #[must_use]
    pub fn vault_dir(&self) -> &Path {
        &self.shared.vault_dir
    }

    /// Whether both vault files are present on disk. Does not require an
    /// unlocked store.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.shared.vault_dir.join(SALT_FILE).exists()
            && self.shared.vault_dir.join(VAULT_FILE).exists()
    }

    /// Whether the store currently holds an unlocked session.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.lock_inner().session.is_some()
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Initialize a fresh vault: new salt, new empty document, persisted
    /// immediately. Leaves the store unlocked.
    ///
    /// # Errors
    ///
    /// [`VaultError::AlreadyExists`] when vault files are already present;
    /// KDF, encryption, and I/O errors otherwise.
    pub fn setup(&self, password: &str) -> Result<(), VaultError> {
        if self.exists() {
            return Err(VaultError::AlreadyExists(
                self.shared.vault_dir.display().to_string(),
            ));
        }
        std::fs::create_dir_all(&self.shared.vault_dir)?;

        let salt = kdf::generate_salt();
        let key = kdf::derive(password.as_bytes(), &salt)?;
        let document = VaultDocument::new();

        let envelope = encrypt_json(&document, &key)?;
        write_file_0600(
            &self.shared.vault_dir.join(SALT_FILE),
            HEXLOWER.encode(&salt).as_bytes(),
        )?;
        write_file_0600(&self.shared.vault_dir.join(VAULT_FILE), &envelope)?;

        let mut inner = self.lock_inner();
        inner.session = Some(Session {
            key: key.clone(),
            document,
        });
        inner.save_due = None;
        drop(inner);

        self.loan_key_to_logger(key);
        self.log_lock("Vault created and unlocked");
        Ok(())
    }

    /// Unlock with the master password. No-op when already unlocked.
    ///
    /// Re-asserts `0600` on both files and normalizes favorites; legacy
    /// secrets are left in their on-disk shape.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotInitialized`] when no vault exists,
    /// [`VaultError::InvalidPassword`] when the envelope fails to
    /// authenticate (the derived key is dropped before returning),
    /// [`VaultError::Corrupted`] for undecodable salt or payload.
    pub fn unlock(&self, password: &str) -> Result<(), VaultError> {
        {
            let inner = self.lock_inner();
            if inner.session.is_some() {
                return Ok(());
            }
        }
        if !self.exists() {
            return Err(VaultError::NotInitialized);
        }

        let salt_path = self.shared.vault_dir.join(SALT_FILE);
        let vault_path = self.shared.vault_dir.join(VAULT_FILE);

        let salt_hex = std::fs::read_to_string(&salt_path)?;
        let salt = HEXLOWER_PERMISSIVE
            .decode(salt_hex.trim().as_bytes())
            .map_err(|e| VaultError::Corrupted(format!("salt file: {e}")))?;

        let key = kdf::derive(password.as_bytes(), &salt)?;
        let envelope = std::fs::read(&vault_path)?;
        let mut document: VaultDocument = match decrypt_json(&envelope, &key) {
            Ok(doc) => doc,
            Err(CryptoError::Decryption) => {
                drop(key);
                return Err(VaultError::InvalidPassword);
            }
            Err(e) => return Err(e.into()),
        };

        document.normalize();
        ensure_mode_0600(&salt_path)?;
        ensure_mode_0600(&vault_path)?;

        let mut inner = self.lock_inner();
        inner.session = Some(Session {
            key: key.clone(),
            document,
        });
        inner.save_due = None;
        drop(inner);

        self.loan_key_to_logger(key);
        self.log_lock("Vault unlocked");
        Ok(())
    }

    /// Lock the store: cancel the pending save, persist, clear the
    /// logger's borrowed key, and wipe the session. Idempotent.
    ///
    /// With `sync = false` the final write happens on a background thread;
    /// the store observes the locked state immediately either way.
    ///
    /// # Errors
    ///
    /// Propagates persistence errors in the synchronous path. The store
    /// ends up locked even then.
    pub fn lock(&self, sync: bool) -> Result<(), VaultError> {
        let session = {
            let mut inner = self.lock_inner();
            inner.save_due = None;
            match inner.session.take() {
                Some(s) => s,
                None => return Ok(()),
            }
        };

        self.log_lock("Vault locked");

        let result = if sync {
            persist_session(&self.shared.vault_dir, &session)
        } else {
            let dir = self.shared.vault_dir.clone();
            std::thread::spawn(move || {
                if let Err(e) = persist_session(&dir, &session) {
                    tracing::warn!(error = %e, "background save on lock failed");
                }
            });
            Ok(())
        };

        if let Some(logger) = lock_or_recover(&self.shared.logger).as_ref() {
            logger.clear_encryption_key();
        }
        result
    }

    /// Cancel the debounce timer and write the document durably now.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when locked; encryption and I/O errors
    /// otherwise.
    pub fn save_now(&self) -> Result<(), VaultError> {
        let mut inner = self.lock_inner();
        inner.save_due = None;
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        persist_session(&self.shared.vault_dir, session)
    }

    // -- Projects ----------------------------------------------------------

    /// List all projects with secret counts.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when locked.
    pub fn get_projects(&self) -> Result<Vec<ProjectSummary>, VaultError> {
        let inner = self.lock_inner();
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        Ok(session
            .document
            .projects
            .values()
            .map(|p| ProjectSummary {
                name: p.name.clone(),
                secret_count: p.secrets.len(),
                created_at: p.created_at.clone(),
                updated_at: p.updated_at.clone(),
            })
            .collect())
    }

    /// Create an empty project.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectExists`] when the name is taken.
    pub fn create_project(&self, name: &str) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        if session.document.projects.contains_key(name) {
            return Err(VaultError::ProjectExists(name.to_string()));
        }
        session
            .document
            .projects
            .insert(name.to_string(), Project::new(name));
        session.document.touch();
        arm_save(&mut inner.save_due);
        Ok(())
    }

    /// Delete a project and every favorite that points into it.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] when absent.
    pub fn delete_project(&self, name: &str) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        if session.document.projects.remove(name).is_none() {
            return Err(VaultError::ProjectNotFound(name.to_string()));
        }
        session.document.favorites.projects.retain(|p| p != name);
        session.document.favorites.secrets.remove(name);
        session.document.touch();
        arm_save(&mut inner.save_due);
        Ok(())
    }

    // -- Secrets -----------------------------------------------------------

    /// All secrets of a project as read views (history excluded).
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] when the project is absent.
    pub fn get_secrets(&self, project: &str) -> Result<BTreeMap<String, SecretView>, VaultError> {
        let inner = self.lock_inner();
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        let proj = session
            .document
            .projects
            .get(project)
            .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
        Ok(proj
            .secrets
            .iter()
            .map(|(k, record)| (k.clone(), record_view(record, proj)))
            .collect())
    }

    /// A single secret as a read view.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] / [`VaultError::SecretNotFound`].
    pub fn get_secret(&self, project: &str, key: &str) -> Result<SecretView, VaultError> {
        let inner = self.lock_inner();
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        let proj = session
            .document
            .projects
            .get(project)
            .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
        let record = proj
            .secrets
            .get(key)
            .ok_or_else(|| VaultError::SecretNotFound {
                project: project.to_string(),
                key: key.to_string(),
            })?;
        Ok(record_view(record, proj))
    }

    /// Create or update a secret.
    ///
    /// An update pushes the previous `(value, expiresAt)` to the history
    /// head only when the pair actually changed; writing the identical
    /// pair is a complete no-op. History is capped at [`MAX_HISTORY`].
    /// A legacy string record is upgraded to the structured form here.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] when the project is absent.
    pub fn set_secret(
        &self,
        project: &str,
        key: &str,
        value: &str,
        expires_at: Option<&str>,
    ) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        if set_secret_in(&mut session.document, project, key, value, expires_at)? {
            session.document.touch();
            arm_save(&mut inner.save_due);
        }
        Ok(())
    }

    /// Bulk import: set every `(key, value)` pair with no expiry.
    /// Entries identical to the current value are skipped.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] when the project is absent.
    pub fn set_secrets(
        &self,
        project: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        let mut changed = false;
        for (key, value) in entries {
            if set_secret_in(&mut session.document, project, key, value, None)? {
                changed = true;
            }
        }
        if changed {
            session.document.touch();
            arm_save(&mut inner.save_due);
        }
        Ok(())
    }

    /// Delete a secret and any favorite pointing at it.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] / [`VaultError::SecretNotFound`].
    pub fn delete_secret(&self, project: &str, key: &str) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        let proj = session
            .document
            .projects
            .get_mut(project)
            .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
        if proj.secrets.remove(key).is_none() {
            return Err(VaultError::SecretNotFound {
                project: project.to_string(),
                key: key.to_string(),
            });
        }
        proj.updated_at = now_iso8601();
        let entry_empty = match session.document.favorites.secrets.get_mut(project) {
            Some(keys) => {
                keys.retain(|k| k != key);
                keys.is_empty()
            }
            None => false,
        };
        if entry_empty {
            session.document.favorites.secrets.remove(project);
        }
        session.document.touch();
        arm_save(&mut inner.save_due);
        Ok(())
    }

    /// The full version timeline of a secret.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] / [`VaultError::SecretNotFound`].
    pub fn get_secret_history(&self, project: &str, key: &str) -> Result<SecretHistory, VaultError> {
        let inner = self.lock_inner();
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        let proj = session
            .document
            .projects
            .get(project)
            .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
        let record = proj
            .secrets
            .get(key)
            .ok_or_else(|| VaultError::SecretNotFound {
                project: project.to_string(),
                key: key.to_string(),
            })?;

        let view = record_view(record, proj);
        let current = SecretVersion {
            value: view.value,
            expires_at: view.expires_at,
            changed_at: view.updated_at,
            is_current: true,
        };
        let history: Vec<SecretVersion> = match record {
            SecretRecord::Structured(s) => s
                .history
                .iter()
                .map(|h| SecretVersion {
                    value: h.value.clone(),
                    expires_at: h.expires_at.clone(),
                    changed_at: h.changed_at.clone(),
                    is_current: false,
                })
                .collect(),
            SecretRecord::Legacy(_) => Vec::new(),
        };
        let total_versions = history.len().saturating_add(1);
        Ok(SecretHistory {
            current,
            history,
            total_versions,
        })
    }

    /// Make a historical version current again. The replaced value is
    /// recorded in history like any other write.
    ///
    /// # Errors
    ///
    /// [`VaultError::VersionOutOfRange`] for a bad index, plus the usual
    /// not-found errors.
    pub fn restore_secret_version(
        &self,
        project: &str,
        key: &str,
        index: usize,
    ) -> Result<(), VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;

        let (value, expires_at) = {
            let proj = session
                .document
                .projects
                .get(project)
                .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
            let record = proj
                .secrets
                .get(key)
                .ok_or_else(|| VaultError::SecretNotFound {
                    project: project.to_string(),
                    key: key.to_string(),
                })?;
            let history = match record {
                SecretRecord::Structured(s) => s.history.as_slice(),
                SecretRecord::Legacy(_) => &[],
            };
            let entry = history.get(index).ok_or(VaultError::VersionOutOfRange {
                index,
                available: history.len(),
            })?;
            (entry.value.clone(), entry.expires_at.clone())
        };

        if set_secret_in(
            &mut session.document,
            project,
            key,
            &value,
            expires_at.as_deref(),
        )? {
            session.document.touch();
            arm_save(&mut inner.save_due);
        }
        Ok(())
    }

    // -- Favorites ---------------------------------------------------------

    /// Toggle a project's favorite flag. Returns the new state.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] when the project is absent.
    pub fn toggle_project_favorite(&self, name: &str) -> Result<bool, VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        if !session.document.projects.contains_key(name) {
            return Err(VaultError::ProjectNotFound(name.to_string()));
        }
        let favorites = &mut session.document.favorites.projects;
        let now_favorite = if favorites.iter().any(|p| p == name) {
            favorites.retain(|p| p != name);
            false
        } else {
            favorites.push(name.to_string());
            true
        };
        session.document.touch();
        arm_save(&mut inner.save_due);
        Ok(now_favorite)
    }

    /// Toggle a secret's favorite flag. Returns the new state.
    ///
    /// # Errors
    ///
    /// [`VaultError::ProjectNotFound`] / [`VaultError::SecretNotFound`].
    pub fn toggle_secret_favorite(&self, project: &str, key: &str) -> Result<bool, VaultError> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let session = inner.session.as_mut().ok_or(VaultError::Locked)?;
        let proj = session
            .document
            .projects
            .get(project)
            .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
        if !proj.secrets.contains_key(key) {
            return Err(VaultError::SecretNotFound {
                project: project.to_string(),
                key: key.to_string(),
            });
        }

        let (now_favorite, entry_empty) = {
            let keys = session
                .document
                .favorites
                .secrets
                .entry(project.to_string())
                .or_default();
            let now_favorite = if keys.iter().any(|k| k == key) {
                keys.retain(|k| k != key);
                false
            } else {
                keys.push(key.to_string());
                true
            };
            (now_favorite, keys.is_empty())
        };
        if entry_empty {
            session.document.favorites.secrets.remove(project);
        }
        session.document.touch();
        arm_save(&mut inner.save_due);
        Ok(now_favorite)
    }

    // -- Statistics --------------------------------------------------------

    /// Aggregate counts, including secrets expiring within the next week.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when locked.
    pub fn get_statistics(&self) -> Result<VaultStatistics, VaultError> {
        let inner = self.lock_inner();
        let session = inner.session.as_ref().ok_or(VaultError::Locked)?;
        let now = now_iso8601();
        let next_week = iso8601_after_days(7);

        let mut total_secrets = 0usize;
        let mut expiring = 0usize;
        let mut has_expired = false;
        for proj in session.document.projects.values() {
            total_secrets = total_secrets.saturating_add(proj.secrets.len());
            for record in proj.secrets.values() {
                if let Some(expiry) = record.expires_at() {
                    if expiry <= next_week.as_str() {
                        expiring = expiring.saturating_add(1);
                    }
                    if expiry < now.as_str() {
                        has_expired = true;
                    }
                }
            }
        }

        Ok(VaultStatistics {
            total_projects: session.document.projects.len(),
            total_secrets,
            expiring_secrets: expiring,
            has_expired,
        })
    }

    // -- Internals ---------------------------------------------------------

    fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        lock_or_recover(&self.shared.inner)
    }

    fn loan_key_to_logger(&self, key: SecretBytes<32>) {
        if let Some(logger) = lock_or_recover(&self.shared.logger).as_ref() {
            logger.set_encryption_key(key);
        }
    }

    fn log_lock(&self, event: &str) {
        if let Some(logger) = lock_or_recover(&self.shared.logger).as_ref() {
            logger.log_lock(event);
        }
    }
}

/// Lock a mutex, recovering the guard from a poisoned lock. Vault state
/// stays consistent across panics because every mutation completes before
/// the guard drops.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Arm (or re-arm) the debounced save deadline.
fn arm_save(save_due: &mut Option<Instant>) {
    *save_due = Instant::now().checked_add(SAVE_DEBOUNCE);
}

/// Encrypt and write the session document.
fn persist_session(vault_dir: &Path, session: &Session) -> Result<(), VaultError> {
    let envelope = encrypt_json(&session.document, &session.key)?;
    write_file_0600(&vault_dir.join(VAULT_FILE), &envelope)?;
    Ok(())
}

/// Background flusher: persist once the debounce deadline passes. Exits
/// when every store handle is gone or the cancel flag is set.
fn flusher_loop(shared: &Weak<Shared>) {
    loop {
        std::thread::sleep(FLUSH_TICK);
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut inner = lock_or_recover(&shared.inner);
        let due = inner
            .save_due
            .map_or(false, |deadline| Instant::now() >= deadline);
        if due {
            inner.save_due = None;
            if let Some(session) = inner.session.as_ref() {
                if let Err(e) = persist_session(&shared.vault_dir, session) {
                    tracing::warn!(error = %e, "debounced save failed");
                }
            }
        }
    }
}

/// Shared write path for `set_secret`, `set_secrets`, and
/// `restore_secret_version`. Returns whether anything changed.
fn set_secret_in(
    document: &mut VaultDocument,
    project: &str,
    key: &str,
    value: &str,
    expires_at: Option<&str>,
) -> Result<bool, VaultError> {
    let proj = document
        .projects
        .get_mut(project)
        .ok_or_else(|| VaultError::ProjectNotFound(project.to_string()))?;
    let now = now_iso8601();

    if !proj.secrets.contains_key(key) {
        proj.secrets.insert(
            key.to_string(),
            SecretRecord::Structured(Secret {
                value: value.to_string(),
                expires_at: expires_at.map(str::to_string),
                created_at: now.clone(),
                updated_at: now.clone(),
                history: Vec::new(),
            }),
        );
        proj.updated_at = now;
        return Ok(true);
    }

    // Legacy records have no timestamps of their own; the owning
    // project's stand in.
    let proj_created = proj.created_at.clone();
    let proj_updated = proj.updated_at.clone();
    let Some(record) = proj.secrets.get_mut(key) else {
        return Ok(false);
    };

    let (prev_value, prev_expires, prev_created, prev_updated, prev_history) = match record {
        SecretRecord::Structured(s) => (
            s.value.clone(),
            s.expires_at.clone(),
            s.created_at.clone(),
            s.updated_at.clone(),
            std::mem::take(&mut s.history),
        ),
        SecretRecord::Legacy(v) => (v.clone(), None, proj_created, proj_updated, Vec::new()),
    };

    if prev_value == value && prev_expires.as_deref() == expires_at {
        // Identical pair: put the history back and report no change.
        if let SecretRecord::Structured(s) = record {
            s.history = prev_history;
        }
        return Ok(false);
    }

    let mut history = prev_history;
    history.insert(
        0,
        HistoryEntry {
            value: prev_value,
            expires_at: prev_expires,
            changed_at: prev_updated,
        },
    );
    history.truncate(MAX_HISTORY);

    *record = SecretRecord::Structured(Secret {
        value: value.to_string(),
        expires_at: expires_at.map(str::to_string),
        created_at: prev_created,
        updated_at: now.clone(),
        history,
    });

    proj.updated_at = now;
    Ok(true)
}

/// Build a read view; legacy records borrow the project's timestamps.
fn record_view(record: &SecretRecord, project: &Project) -> SecretView {
    match record {
        SecretRecord::Structured(s) => SecretView {
            value: s.value.clone(),
            expires_at: s.expires_at.clone(),
            created_at: s.created_at.clone(),
            updated_at: s.updated_at.clone(),
        },
        SecretRecord::Legacy(v) => SecretView {
            value: v.clone(),
            expires_at: None,
            created_at: project.created_at.clone(),
            updated_at: project.updated_at.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
