//! `coffret-crypto-core` - Pure cryptographic primitives for Coffret.
//!
//! This crate is the audit target: zero network, zero async dependencies.
//! Everything above it (vault, broker) builds on these four modules.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod kdf;

pub mod envelope;

pub mod masking;

pub use envelope::{decrypt_json, encrypt_json, open, seal, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use error::CryptoError;
pub use kdf::{derive, generate_salt, SALT_LEN};
pub use masking::{constant_time_eq, mask_value};
pub use memory::{SecretBuffer, SecretBytes};
