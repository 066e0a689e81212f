#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Licence verification fixed vectors: canonical-JSON byte stability,
//! signature and product checks, and the persistence lifecycle.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use coffret_broker::{ActivationError, LicenseFailure, LicenseVerifier, LICENSE_FILE, PRODUCT_TAG};
use ring::signature::{Ed25519KeyPair, KeyPair};
use tempfile::TempDir;

/// Fixture signer: a throwaway authority key pair.
struct Authority {
    keypair: Ed25519KeyPair,
    public: [u8; 32],
}

impl Authority {
    fn new() -> Self {
        let seed = [0x42u8; 32];
        let keypair = Ed25519KeyPair::from_seed_unchecked(&seed).expect("keygen should succeed");
        let mut public = [0u8; 32];
        public.copy_from_slice(keypair.public_key().as_ref());
        Self { keypair, public }
    }

    fn sign(&self, licence: &serde_json::Value) -> String {
        let canonical = serde_json::to_vec(licence).expect("canonical encoding");
        BASE64.encode(self.keypair.sign(&canonical).as_ref())
    }
}

fn valid_licence() -> serde_json::Value {
    serde_json::json!({
        "product": PRODUCT_TAG,
        "email": "dev@example.com",
        "issuedAt": "2026-01-15T09:30:00Z",
        "plan": "pro",
    })
}

#[test]
fn missing_file_reports_no_local_license() {
    let dir = TempDir::new().expect("tempdir");
    let status = LicenseVerifier::new(dir.path()).check_local_license();
    assert!(!status.valid);
    assert_eq!(status.reason, Some(LicenseFailure::NoLocalLicense));
}

#[test]
fn malformed_file_reports_invalid_format() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join(LICENSE_FILE), "{ not json").expect("write");
    let status = LicenseVerifier::new(dir.path()).check_local_license();
    assert_eq!(status.reason, Some(LicenseFailure::InvalidLicenseFormat));
}

#[test]
fn valid_licence_roundtrips_through_save() {
    let dir = TempDir::new().expect("tempdir");
    let authority = Authority::new();
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);

    let licence = valid_licence();
    let signature = authority.sign(&licence);
    verifier
        .save_license(&licence, &signature)
        .expect("save should succeed");

    let status = verifier.check_local_license();
    assert!(status.valid, "reason: {:?}", status.reason);
    assert_eq!(status.licence.expect("licence")["email"], "dev@example.com");
}

#[test]
fn tampered_licence_fails_signature_check() {
    let dir = TempDir::new().expect("tempdir");
    let authority = Authority::new();
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);

    let licence = valid_licence();
    let signature = authority.sign(&licence);
    let mut tampered = licence;
    tampered["plan"] = serde_json::json!("enterprise");
    verifier
        .save_license(&tampered, &signature)
        .expect("save should succeed");

    let status = verifier.check_local_license();
    assert_eq!(status.reason, Some(LicenseFailure::InvalidSignature));
}

#[test]
fn wrong_product_fails_after_signature_passes() {
    let dir = TempDir::new().expect("tempdir");
    let authority = Authority::new();
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);

    let licence = serde_json::json!({ "product": "autre-produit", "plan": "pro" });
    let signature = authority.sign(&licence);
    verifier
        .save_license(&licence, &signature)
        .expect("save should succeed");

    let status = verifier.check_local_license();
    assert_eq!(status.reason, Some(LicenseFailure::InvalidProduct));
}

#[test]
fn key_order_is_significant() {
    let authority = Authority::new();
    let dir = TempDir::new().expect("tempdir");
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);

    // Same fields, different insertion order: different canonical bytes,
    // so the signature over one must not verify the other.
    let original: serde_json::Value =
        serde_json::from_str(r#"{"product":"coffret","plan":"pro"}"#).expect("parse");
    let reordered: serde_json::Value =
        serde_json::from_str(r#"{"plan":"pro","product":"coffret"}"#).expect("parse");

    let signature = authority.sign(&original);
    assert!(verifier.verify_signature(&original, &signature).is_ok());
    assert!(verifier.verify_signature(&reordered, &signature).is_err());
}

#[test]
fn canonical_bytes_survive_parse_roundtrip() {
    // What the authority signed must be what a parse then serialize
    // round-trip produces, including non-ASCII and nested objects.
    let raw = r#"{"product":"coffret","name":"Éloïse Dûpont","limits":{"seats":3,"machines":["laptop","desktop"]},"note":"πανοπλία"}"#;
    let parsed: serde_json::Value = serde_json::from_str(raw).expect("parse");
    let reserialized = serde_json::to_string(&parsed).expect("serialize");
    assert_eq!(raw, reserialized);
}

#[test]
fn signature_with_bad_base64_is_invalid() {
    let dir = TempDir::new().expect("tempdir");
    let verifier = LicenseVerifier::new(dir.path());
    let result = verifier.verify_signature(&valid_licence(), "!!!not-base64!!!");
    assert_eq!(result, Err(LicenseFailure::InvalidSignature));
}

#[test]
fn delete_license_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let authority = Authority::new();
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);

    let licence = valid_licence();
    let signature = authority.sign(&licence);
    verifier
        .save_license(&licence, &signature)
        .expect("save should succeed");

    verifier.delete_license().expect("delete should succeed");
    verifier.delete_license().expect("second delete should succeed");
    assert!(!dir.path().join(LICENSE_FILE).exists());
}

#[cfg(unix)]
#[test]
fn license_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("tempdir");
    let authority = Authority::new();
    let verifier = LicenseVerifier::new(dir.path()).with_public_key(authority.public);
    let licence = valid_licence();
    let signature = authority.sign(&licence);
    verifier
        .save_license(&licence, &signature)
        .expect("save should succeed");

    let mode = std::fs::metadata(dir.path().join(LICENSE_FILE))
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}

#[tokio::test]
async fn activation_against_unreachable_endpoint_is_network_error() {
    let dir = TempDir::new().expect("tempdir");
    // Reserved TEST-NET-1 address: nothing listens there.
    let verifier = LicenseVerifier::new(dir.path()).with_endpoint("http://192.0.2.1:9/check");
    let result = verifier.check_license_with_server("KEY-123", "pw").await;
    assert!(matches!(
        result,
        Err(ActivationError::NetworkError | ActivationError::Timeout)
    ));
}
