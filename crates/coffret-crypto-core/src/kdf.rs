//! Argon2id key derivation with fixed parameters.
//!
//! This module provides:
//! - [`generate_salt`]: fresh 16-byte random salt
//! - [`derive`]: derive the 256-bit content key from a password + salt
//!
//! # Fixed Parameters
//!
//! Coffret uses a single compiled-in Argon2id parameter set (64 MiB,
//! 3 iterations, 1 lane, version 0x13). The parameters are part of the
//! on-disk contract: changing them requires a vault document schema
//! version bump, because existing vaults would no longer unlock.

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

/// Output length of the KDF in bytes (256 bits).
const OUTPUT_LEN: usize = 32;

/// Salt length in bytes for freshly generated salts.
pub const SALT_LEN: usize = 16;

/// Minimum accepted salt length. We enforce 16 (stricter than argon2's 8).
const MIN_SALT_LEN: usize = 16;

/// Argon2id memory cost in KiB (64 MiB).
pub const M_COST_KIB: u32 = 65_536;

/// Argon2id iteration count.
pub const T_COST: u32 = 3;

/// Argon2id parallelism.
pub const P_COST: u32 = 1;

/// Generate a fresh random salt from the OS CSPRNG.
#[must_use]
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the 256-bit content key from a password and salt using Argon2id.
///
/// Returns a [`SecretBytes<32>`]; the intermediate output buffer is
/// zeroized after copying.
///
/// Password strength validation (minimum length, complexity) is the
/// caller's concern - this function accepts any password, including empty.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if:
/// - The salt is shorter than 16 bytes
/// - The derivation itself fails (e.g. memory allocation)
pub fn derive(password: &[u8], salt: &[u8]) -> Result<SecretBytes<32>, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let params = argon2::Params::new(M_COST_KIB, T_COST, P_COST, Some(OUTPUT_LEN))
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = [0u8; OUTPUT_LEN];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2id derivation failed: {e}")))?;

    let result = SecretBytes::new(output);
    output.zeroize();
    Ok(result)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
