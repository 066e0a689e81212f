//! AES-256-GCM authenticated encryption envelope.
//!
//! This module provides:
//! - [`seal`] / [`open`]: raw byte encryption with the wire format
//!   `nonce (12) || ciphertext || tag (16)`
//! - [`encrypt_json`] / [`decrypt_json`]: the JSON envelope used for the
//!   vault document and the event log
//!
//! A fresh random 96-bit nonce is generated per call and travels with the
//! ciphertext. Any modification to nonce, ciphertext, or tag causes
//! decryption to fail with [`CryptoError::Decryption`].

use crate::error::CryptoError;
use crate::memory::{SecretBuffer, SecretBytes};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256-GCM key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum valid envelope length: nonce + empty ciphertext + tag.
const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN;

/// Encrypt plaintext, returning `nonce || ciphertext || tag`.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the underlying AEAD operation fails.
pub fn seal(plaintext: &[u8], key: &SecretBytes<KEY_LEN>) -> Result<Vec<u8>, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let sealing_key = aead::LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Encrypt in place - the plaintext buffer becomes ciphertext.
    let mut in_out = plaintext.to_vec();
    let Ok(tag) =
        sealing_key.seal_in_place_separate_tag(nonce, aead::Aad::empty(), &mut in_out)
    else {
        in_out.zeroize();
        return Err(CryptoError::Encryption("AES-256-GCM encryption failed".into()));
    };

    let capacity = NONCE_LEN
        .saturating_add(in_out.len())
        .saturating_add(TAG_LEN);
    let mut envelope = Vec::with_capacity(capacity);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&in_out);
    envelope.extend_from_slice(tag.as_ref());
    Ok(envelope)
}

/// Decrypt a `nonce || ciphertext || tag` envelope.
///
/// Returns the plaintext as a [`SecretBuffer`] (zeroized on drop). The
/// intermediate decryption buffer is zeroized after copying.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` if the envelope is shorter than
/// 28 bytes, or `CryptoError::Decryption` if authentication fails
/// (tampered data or wrong key).
pub fn open(envelope: &[u8], key: &SecretBytes<KEY_LEN>) -> Result<SecretBuffer, CryptoError> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::Encryption(format!(
            "envelope too short: {} bytes (minimum {MIN_ENVELOPE_LEN})",
            envelope.len()
        )));
    }

    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key.expose())
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    let opening_key = aead::LessSafeKey::new(unbound);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&envelope[..NONCE_LEN]);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    // Everything after the nonce is ciphertext || tag, which is exactly
    // the in-place layout `open_in_place` expects.
    let mut ct_tag = envelope[NONCE_LEN..].to_vec();
    let plaintext = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext);
    ct_tag.zeroize();
    Ok(result)
}

/// Serialize `value` to JSON and encrypt it into an envelope.
///
/// # Errors
///
/// Returns `CryptoError::Serialization` if JSON serialization fails, or
/// `CryptoError::Encryption` if sealing fails.
pub fn encrypt_json<T: Serialize>(
    value: &T,
    key: &SecretBytes<KEY_LEN>,
) -> Result<Vec<u8>, CryptoError> {
    let mut plaintext = serde_json::to_vec(value)
        .map_err(|e| CryptoError::Serialization(format!("JSON encoding failed: {e}")))?;
    let envelope = seal(&plaintext, key);
    plaintext.zeroize();
    envelope
}

/// Decrypt an envelope and deserialize the JSON payload.
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on auth-tag mismatch, or
/// `CryptoError::Serialization` if the decrypted payload is not valid
/// JSON for `T`.
pub fn decrypt_json<T: DeserializeOwned>(
    envelope: &[u8],
    key: &SecretBytes<KEY_LEN>,
) -> Result<T, CryptoError> {
    let plaintext = open(envelope, key)?;
    serde_json::from_slice(plaintext.expose())
        .map_err(|e| CryptoError::Serialization(format!("JSON decoding failed: {e}")))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn test_key() -> SecretBytes<32> {
        SecretBytes::new([0xAA; 32])
    }

    fn wrong_key() -> SecretBytes<32> {
        SecretBytes::new([0xBB; 32])
    }

    #[test]
    fn seal_produces_expected_length() {
        let plaintext = b"hello, coffret";
        let envelope = seal(plaintext, &test_key()).expect("seal should succeed");
        assert_eq!(envelope.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
    }

    #[test]
    fn seal_open_roundtrip() {
        let plaintext = b"secret vault data";
        let envelope = seal(plaintext, &test_key()).expect("seal should succeed");
        let opened = open(&envelope, &test_key()).expect("open should succeed");
        assert_eq!(opened.expose(), plaintext);
    }

    #[test]
    fn open_fails_on_tampered_ciphertext() {
        let mut envelope = seal(b"test data", &test_key()).expect("seal should succeed");
        envelope[NONCE_LEN] ^= 0xFF;
        let result = open(&envelope, &test_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_fails_on_tampered_tag() {
        let mut envelope = seal(b"test data", &test_key()).expect("seal should succeed");
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;
        let result = open(&envelope, &test_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_fails_with_wrong_key() {
        let envelope = seal(b"test data", &test_key()).expect("seal should succeed");
        let result = open(&envelope, &wrong_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_rejects_short_envelope() {
        let result = open(&[0u8; MIN_ENVELOPE_LEN - 1], &test_key());
        assert!(matches!(result, Err(CryptoError::Encryption(_))));
    }

    #[test]
    fn two_seals_produce_different_nonces() {
        let a = seal(b"same data", &test_key()).expect("seal should succeed");
        let b = seal(b"same data", &test_key()).expect("seal should succeed");
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn seal_empty_plaintext_succeeds() {
        let envelope = seal(&[], &test_key()).expect("seal empty should succeed");
        assert_eq!(envelope.len(), MIN_ENVELOPE_LEN);
        let opened = open(&envelope, &test_key()).expect("open empty should succeed");
        assert!(opened.expose().is_empty());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    #[test]
    fn json_envelope_roundtrip() {
        let value = Payload {
            name: "api-keys".into(),
            count: 7,
        };
        let envelope = encrypt_json(&value, &test_key()).expect("encrypt should succeed");
        let decoded: Payload = decrypt_json(&envelope, &test_key()).expect("decrypt should succeed");
        assert_eq!(decoded, value);
    }

    #[test]
    fn json_envelope_fails_with_wrong_key() {
        let value = Payload {
            name: "x".into(),
            count: 0,
        };
        let envelope = encrypt_json(&value, &test_key()).expect("encrypt should succeed");
        let result: Result<Payload, _> = decrypt_json(&envelope, &wrong_key());
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn json_envelope_rejects_mismatched_shape() {
        let envelope = encrypt_json(&vec![1u32, 2, 3], &test_key()).expect("encrypt should succeed");
        let result: Result<Payload, _> = decrypt_json(&envelope, &test_key());
        assert!(matches!(result, Err(CryptoError::Serialization(_))));
    }
}
