//! Secure memory types for cryptographic key material.
//!
//! This module provides:
//! - [`SecretBytes`]: fixed-size key material (e.g. the derived vault key)
//! - [`SecretBuffer`]: variable-length sensitive data (e.g. decrypted plaintext)
//!
//! Both wrap `secrecy` containers so the bytes are zeroized on drop and
//! masked in `Debug` output to prevent accidental leakage into logs.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox, SecretSlice};
use std::fmt;
use zeroize::Zeroize;

// ---------------------------------------------------------------------------
// SecretBytes - fixed-length
// ---------------------------------------------------------------------------

/// Fixed-size secret byte array, zeroized on drop.
///
/// Used for key material with a compile-time-known length (the 256-bit
/// content key is `SecretBytes<32>`). The `Debug` implementation is masked.
pub struct SecretBytes<const N: usize> {
    inner: SecretBox<[u8; N]>,
}

impl<const N: usize> SecretBytes<N> {
    /// Wrap the given bytes. The caller should zeroize its own copy after
    /// calling this - the array is passed by value and a stack copy remains
    /// on the caller's side.
    #[must_use]
    pub fn new(bytes: [u8; N]) -> Self {
        Self {
            inner: SecretBox::new(Box::new(bytes)),
        }
    }

    /// Create a `SecretBytes` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; N];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        let result = Self::new(bytes);
        bytes.zeroize();
        Ok(result)
    }

    /// Expose the underlying bytes. Use sparingly - only when the raw
    /// bytes are needed for a cryptographic operation, and prefer using
    /// the slice within a single expression.
    #[must_use]
    pub fn expose(&self) -> &[u8; N] {
        self.inner.expose_secret()
    }
}

impl<const N: usize> Clone for SecretBytes<N> {
    fn clone(&self) -> Self {
        let mut bytes = *self.inner.expose_secret();
        let cloned = Self::new(bytes);
        bytes.zeroize();
        cloned
    }
}

impl<const N: usize> fmt::Debug for SecretBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes(***)")
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer - variable-length
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data, zeroized on drop.
///
/// Decrypted envelope plaintext travels through this type so intermediate
/// JSON bytes never outlive the operation that produced them.
pub struct SecretBuffer {
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Create a new `SecretBuffer` by copying the given data.
    ///
    /// The caller should zeroize the source after calling this.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        Self {
            inner: data.to_vec().into(),
        }
    }

    /// Expose the underlying bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
