//! The vault document model - projects, secrets, history, favorites.
//!
//! This is the plaintext payload encrypted at rest in `vault.enc`. Field
//! names serialize as camelCase to stay byte-compatible with vaults
//! written by earlier releases. Maps are `BTreeMap<String, _>` so keys are
//! plain strings with deterministic serialization order and no collision
//! with any language-level object machinery.
//!
//! # Legacy secrets
//!
//! Early vault files stored a secret as a bare JSON string. Those parse
//! into [`SecretRecord::Legacy`] and are preserved unchanged in memory and
//! on re-serialization; the first mutating write upgrades the record to
//! the structured form. Unlock never mass-upgrades.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::clock::now_iso8601;

/// Maximum number of history entries retained per secret. Older entries
/// are evicted from the tail.
pub const MAX_HISTORY: usize = 50;

/// Semantic version of the document schema.
pub const DOCUMENT_VERSION: &str = "2.0.0";

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

/// The complete vault payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDocument {
    /// Schema version of this document.
    pub version: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last mutation timestamp (ISO 8601).
    pub updated_at: String,
    /// Projects by name.
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    /// Favorite markers, validated against `projects` on unlock.
    #[serde(default)]
    pub favorites: Favorites,
}

impl VaultDocument {
    /// Create an empty document at the current schema version.
    #[must_use]
    pub fn new() -> Self {
        let now = now_iso8601();
        Self {
            version: DOCUMENT_VERSION.to_string(),
            created_at: now.clone(),
            updated_at: now,
            projects: BTreeMap::new(),
            favorites: Favorites::default(),
        }
    }

    /// Repair invariants after deserializing an on-disk document.
    ///
    /// Favorites entries pointing at missing projects or secrets are
    /// dropped, duplicates are removed (first occurrence wins), and empty
    /// per-project favorite lists are discarded. Secrets themselves are
    /// left untouched - legacy records upgrade lazily on write.
    pub fn normalize(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        let projects = &self.projects;
        self.favorites
            .projects
            .retain(|name| projects.contains_key(name) && seen.insert(name.clone()));

        self.favorites.secrets.retain(|project, keys| {
            let Some(proj) = projects.get(project) else {
                return false;
            };
            let mut seen_keys = std::collections::BTreeSet::new();
            keys.retain(|k| proj.secrets.contains_key(k) && seen_keys.insert(k.clone()));
            !keys.is_empty()
        });
    }

    /// Bump the document-level mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_iso8601();
    }
}

impl Default for VaultDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// A named grouping of related secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project name (matches the key in `VaultDocument::projects`).
    pub name: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last mutation timestamp (ISO 8601).
    pub updated_at: String,
    /// Secrets by key.
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretRecord>,
}

impl Project {
    /// Create an empty project.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let now = now_iso8601();
        Self {
            name: name.to_string(),
            created_at: now.clone(),
            updated_at: now,
            secrets: BTreeMap::new(),
        }
    }
}

/// On-disk secret record - structured, or the legacy bare-string form.
///
/// Untagged: a JSON object parses as [`SecretRecord::Structured`], a JSON
/// string as [`SecretRecord::Legacy`]. Serializing a legacy record writes
/// the bare string back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SecretRecord {
    /// Current structured form.
    Structured(Secret),
    /// Pre-2.0 bare string value.
    Legacy(String),
}

impl SecretRecord {
    /// The current value regardless of form.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Structured(s) => &s.value,
            Self::Legacy(v) => v,
        }
    }

    /// The current expiry regardless of form (legacy records never expire).
    #[must_use]
    pub fn expires_at(&self) -> Option<&str> {
        match self {
            Self::Structured(s) => s.expires_at.as_deref(),
            Self::Legacy(_) => None,
        }
    }
}

/// A structured secret with expiry and mutation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    /// The secret value.
    pub value: String,
    /// Optional expiry (ISO date or timestamp), `null` when absent.
    pub expires_at: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last mutation timestamp (ISO 8601).
    pub updated_at: String,
    /// Prior values, most recent first, capped at [`MAX_HISTORY`].
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Zeroize secret material on drop. Serde necessarily creates
/// intermediate strings this cannot reach; the impl covers the primary
/// in-memory lifetime of the struct, which may span the whole session.
impl Drop for Secret {
    fn drop(&mut self) {
        self.value.zeroize();
        for entry in &mut self.history {
            entry.value.zeroize();
        }
    }
}

/// A superseded secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// The previous value.
    pub value: String,
    /// The previous expiry.
    pub expires_at: Option<String>,
    /// When the value was superseded (the previous `updatedAt`).
    pub changed_at: String,
}

/// Favorite markers for quick access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorites {
    /// Favorite project names, in user order, unique.
    #[serde(default)]
    pub projects: Vec<String>,
    /// Favorite secret keys per project, in user order, unique.
    #[serde(default)]
    pub secrets: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_project(name: &str, keys: &[&str]) -> VaultDocument {
        let mut doc = VaultDocument::new();
        let mut project = Project::new(name);
        for k in keys {
            project.secrets.insert(
                (*k).to_string(),
                SecretRecord::Structured(Secret {
                    value: "v".into(),
                    expires_at: None,
                    created_at: now_iso8601(),
                    updated_at: now_iso8601(),
                    history: Vec::new(),
                }),
            );
        }
        doc.projects.insert(name.to_string(), project);
        doc
    }

    #[test]
    fn new_document_is_empty_and_versioned() {
        let doc = VaultDocument::new();
        assert_eq!(doc.version, DOCUMENT_VERSION);
        assert!(doc.projects.is_empty());
        assert!(doc.favorites.projects.is_empty());
        assert!(doc.favorites.secrets.is_empty());
    }

    #[test]
    fn document_serializes_camel_case() {
        let doc = VaultDocument::new();
        let json = serde_json::to_string(&doc).expect("serialize should succeed");
        assert!(json.contains("createdAt"));
        assert!(json.contains("updatedAt"));
        assert!(!json.contains("created_at"));
    }

    #[test]
    fn legacy_secret_parses_from_bare_string() {
        let record: SecretRecord =
            serde_json::from_str("\"plain-value\"").expect("parse should succeed");
        assert!(matches!(record, SecretRecord::Legacy(_)));
        assert_eq!(record.value(), "plain-value");
        assert_eq!(record.expires_at(), None);
    }

    #[test]
    fn legacy_secret_reserializes_as_bare_string() {
        let record = SecretRecord::Legacy("plain-value".into());
        let json = serde_json::to_string(&record).expect("serialize should succeed");
        assert_eq!(json, "\"plain-value\"");
    }

    #[test]
    fn structured_secret_parses_from_object() {
        let json = r#"{"value":"v1","expiresAt":null,"createdAt":"2026-01-01T00:00:00Z","updatedAt":"2026-01-01T00:00:00Z","history":[]}"#;
        let record: SecretRecord = serde_json::from_str(json).expect("parse should succeed");
        assert!(matches!(record, SecretRecord::Structured(_)));
        assert_eq!(record.value(), "v1");
    }

    #[test]
    fn structured_secret_missing_history_defaults_empty() {
        let json = r#"{"value":"v1","expiresAt":null,"createdAt":"2026-01-01T00:00:00Z","updatedAt":"2026-01-01T00:00:00Z"}"#;
        let record: SecretRecord = serde_json::from_str(json).expect("parse should succeed");
        let SecretRecord::Structured(secret) = record else {
            panic!("expected structured record");
        };
        assert!(secret.history.is_empty());
    }

    #[test]
    fn normalize_drops_dangling_project_favorites() {
        let mut doc = doc_with_project("app", &["K"]);
        doc.favorites.projects = vec!["app".into(), "ghost".into()];
        doc.normalize();
        assert_eq!(doc.favorites.projects, vec!["app".to_string()]);
    }

    #[test]
    fn normalize_drops_duplicate_favorites() {
        let mut doc = doc_with_project("app", &["K"]);
        doc.favorites.projects = vec!["app".into(), "app".into()];
        doc.normalize();
        assert_eq!(doc.favorites.projects.len(), 1);
    }

    #[test]
    fn normalize_drops_dangling_secret_favorites() {
        let mut doc = doc_with_project("app", &["K"]);
        doc.favorites
            .secrets
            .insert("app".into(), vec!["K".into(), "ghost".into(), "K".into()]);
        doc.favorites.secrets.insert("ghost".into(), vec!["X".into()]);
        doc.normalize();
        assert_eq!(
            doc.favorites.secrets.get("app"),
            Some(&vec!["K".to_string()])
        );
        assert!(!doc.favorites.secrets.contains_key("ghost"));
    }

    #[test]
    fn normalize_drops_empty_secret_favorite_lists() {
        let mut doc = doc_with_project("app", &["K"]);
        doc.favorites.secrets.insert("app".into(), vec!["gone".into()]);
        doc.normalize();
        assert!(!doc.favorites.secrets.contains_key("app"));
    }

    #[test]
    fn document_with_missing_favorites_deserializes_with_defaults() {
        let json = r#"{"version":"1.0.0","createdAt":"2025-01-01T00:00:00Z","updatedAt":"2025-01-01T00:00:00Z","projects":{}}"#;
        let doc: VaultDocument = serde_json::from_str(json).expect("parse should succeed");
        assert!(doc.favorites.projects.is_empty());
    }
}
