//! Offline licence verification and online activation.
//!
//! A licence is a JSON object signed by the licence authority with
//! Ed25519. Verification canonical-serializes the licence value and
//! checks the signature against a compiled-in public key - fully offline.
//! Activation POSTs the user's key to the licence endpoint, re-verifies
//! whatever comes back, and persists it to `license.json`.
//!
//! # Canonical serialization
//!
//! The authority signs the compact JSON encoding of the licence object in
//! **insertion order**. `serde_json` is built with `preserve_order`, so a
//! parse → serialize round-trip reproduces the signed bytes exactly. Key
//! reordering, added whitespace, or re-escaping would all break
//! verification; the fixed-vector tests below pin this down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use coffret_vault::clock::now_iso8601;
use coffret_vault::fsutil::write_file_0600;

/// Product tag carried in every valid licence.
pub const PRODUCT_TAG: &str = "coffret";

/// Licence file name inside the vault directory.
pub const LICENSE_FILE: &str = "license.json";

/// Default activation endpoint.
const DEFAULT_ENDPOINT: &str = "https://licence.coffret.app/api/check";

/// Activation request timeout. Fails closed.
const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Ed25519 public key of the licence authority.
const LICENSE_PUBLIC_KEY: [u8; 32] = [
    0x6b, 0x2e, 0x9d, 0x11, 0x4f, 0x83, 0xc5, 0x70, 0x28, 0xaa, 0x31, 0xd6, 0x5c, 0x09, 0xe4,
    0xb7, 0x92, 0x0f, 0x66, 0xdb, 0x3a, 0x81, 0x1c, 0xf5, 0x44, 0xe8, 0x27, 0x9b, 0x60, 0xd3,
    0x8e, 0x52,
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a local licence is not valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseFailure {
    /// No `license.json` on disk.
    NoLocalLicense,
    /// The file exists but is not a well-formed licence file.
    InvalidLicenseFormat,
    /// The Ed25519 signature does not verify.
    InvalidSignature,
    /// The licence was issued for a different product.
    InvalidProduct,
}

/// Result of [`LicenseVerifier::check_local_license`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    /// Whether a valid licence is present.
    pub valid: bool,
    /// Failure reason when `valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<LicenseFailure>,
    /// The licence payload when `valid` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<serde_json::Value>,
}

impl LicenseStatus {
    fn invalid(reason: LicenseFailure) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            licence: None,
        }
    }
}

/// Errors from [`LicenseVerifier::check_license_with_server`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivationError {
    /// The returned licence's signature does not verify.
    #[error("invalid_signature")]
    InvalidSignature,

    /// The returned licence names a different product.
    #[error("invalid_product")]
    InvalidProduct,

    /// The endpoint was unreachable.
    #[error("network_error")]
    NetworkError,

    /// The request timed out.
    #[error("timeout")]
    Timeout,

    /// The response body was not the expected shape.
    #[error("parse_error")]
    ParseError,

    /// The server rejected the activation with its own error code.
    #[error("{0}")]
    Server(String),

    /// Anything else.
    #[error("unknown_error")]
    Unknown,
}

/// A verified activation, ready for [`LicenseVerifier::save_license`].
#[derive(Debug, Clone)]
pub struct Activation {
    /// The signed licence payload.
    pub licence: serde_json::Value,
    /// Base64 Ed25519 signature over the canonical licence bytes.
    pub signature: String,
}

/// On-disk shape of `license.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseFile {
    licence: serde_json::Value,
    signature: String,
    saved_at: String,
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verifies the local licence and performs online activation.
pub struct LicenseVerifier {
    vault_dir: PathBuf,
    public_key: [u8; 32],
    endpoint: String,
}

impl LicenseVerifier {
    /// Verifier for the given vault directory using the compiled-in
    /// authority key and default endpoint.
    #[must_use]
    pub fn new(vault_dir: &Path) -> Self {
        Self {
            vault_dir: vault_dir.to_path_buf(),
            public_key: LICENSE_PUBLIC_KEY,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Override the authority public key (fixture signers in tests).
    #[must_use]
    pub fn with_public_key(mut self, public_key: [u8; 32]) -> Self {
        self.public_key = public_key;
        self
    }

    /// Override the activation endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Check the licence on disk. Never touches the network.
    #[must_use]
    pub fn check_local_license(&self) -> LicenseStatus {
        let path = self.vault_dir.join(LICENSE_FILE);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return LicenseStatus::invalid(LicenseFailure::NoLocalLicense);
        };
        let Ok(file) = serde_json::from_str::<LicenseFile>(&raw) else {
            return LicenseStatus::invalid(LicenseFailure::InvalidLicenseFormat);
        };
        if !file.licence.is_object() {
            return LicenseStatus::invalid(LicenseFailure::InvalidLicenseFormat);
        }
        if self.verify_signature(&file.licence, &file.signature).is_err() {
            return LicenseStatus::invalid(LicenseFailure::InvalidSignature);
        }
        if file.licence.get("product").and_then(serde_json::Value::as_str) != Some(PRODUCT_TAG) {
            return LicenseStatus::invalid(LicenseFailure::InvalidProduct);
        }
        LicenseStatus {
            valid: true,
            reason: None,
            licence: Some(file.licence),
        }
    }

    /// Verify the authority's Ed25519 signature over the canonical
    /// (insertion-order, compact) JSON encoding of `licence`.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseFailure::InvalidSignature`] when the signature is
    /// malformed base64 or fails verification.
    pub fn verify_signature(
        &self,
        licence: &serde_json::Value,
        signature_base64: &str,
    ) -> Result<(), LicenseFailure> {
        let canonical =
            serde_json::to_vec(licence).map_err(|_| LicenseFailure::InvalidSignature)?;
        let sig = BASE64
            .decode(signature_base64)
            .map_err(|_| LicenseFailure::InvalidSignature)?;
        let key = signature::UnparsedPublicKey::new(&signature::ED25519, &self.public_key);
        key.verify(&canonical, &sig)
            .map_err(|_| LicenseFailure::InvalidSignature)
    }

    /// Activate against the licence server.
    ///
    /// POSTs `{userKey, password, program}` and re-verifies the returned
    /// licence locally - a compromised or misconfigured server cannot hand
    /// out a licence this client accepts.
    ///
    /// # Errors
    ///
    /// See [`ActivationError`]; network failures and timeouts fail closed.
    pub async fn check_license_with_server(
        &self,
        user_key: &str,
        password: &str,
    ) -> Result<Activation, ActivationError> {
        let client = reqwest::Client::builder()
            .timeout(ACTIVATION_TIMEOUT)
            .build()
            .map_err(|_| ActivationError::NetworkError)?;

        let body = serde_json::json!({
            "userKey": user_key,
            "password": password,
            "program": PRODUCT_TAG,
        });

        let response = client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ActivationError::Timeout
                } else {
                    ActivationError::NetworkError
                }
            })?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|_| ActivationError::ParseError)?;

        if !status.is_success() {
            return Err(payload
                .get("error")
                .and_then(serde_json::Value::as_str)
                .map_or(ActivationError::Unknown, |e| {
                    ActivationError::Server(e.to_string())
                }));
        }
        if let Some(server_error) = payload.get("error").and_then(serde_json::Value::as_str) {
            return Err(ActivationError::Server(server_error.to_string()));
        }

        let licence = payload
            .get("licence")
            .filter(|l| l.is_object())
            .cloned()
            .ok_or(ActivationError::ParseError)?;
        let signature = payload
            .get("signature")
            .and_then(serde_json::Value::as_str)
            .ok_or(ActivationError::ParseError)?
            .to_string();

        self.verify_signature(&licence, &signature)
            .map_err(|_| ActivationError::InvalidSignature)?;
        if licence.get("product").and_then(serde_json::Value::as_str) != Some(PRODUCT_TAG) {
            return Err(ActivationError::InvalidProduct);
        }

        Ok(Activation { licence, signature })
    }

    /// Persist a licence to `license.json` at mode `0600`.
    ///
    /// # Errors
    ///
    /// Serialization and I/O errors.
    pub fn save_license(
        &self,
        licence: &serde_json::Value,
        signature: &str,
    ) -> Result<(), crate::error::BrokerError> {
        std::fs::create_dir_all(&self.vault_dir)?;
        let file = LicenseFile {
            licence: licence.clone(),
            signature: signature.to_string(),
            saved_at: now_iso8601(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| crate::error::BrokerError::Serialization(e.to_string()))?;
        write_file_0600(&self.vault_dir.join(LICENSE_FILE), &json)?;
        Ok(())
    }

    /// Remove `license.json`. Idempotent.
    ///
    /// # Errors
    ///
    /// I/O errors other than the file already being gone.
    pub fn delete_license(&self) -> Result<(), crate::error::BrokerError> {
        match std::fs::remove_file(self.vault_dir.join(LICENSE_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(crate::error::BrokerError::Io(e)),
        }
    }
}
