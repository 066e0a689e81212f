//! Value masking and constant-time comparison.
//!
//! This module provides:
//! - [`mask_value`]: keep a prefix, replace the remainder with `*`
//! - [`constant_time_eq`]: timing-safe equality for bearer tokens
//!
//! Every token comparison in Coffret (the access server's bearer check in
//! particular) must go through [`constant_time_eq`] - a short-circuiting
//! `==` on attacker-supplied input leaks match length through timing.

use subtle::ConstantTimeEq;

/// Mask a sensitive value, preserving the first `keep` characters.
///
/// Operates on characters (not bytes), so multi-byte input cannot be
/// split mid-codepoint. A `keep` larger than the input returns the input
/// unchanged.
#[must_use]
pub fn mask_value(value: &str, keep: usize) -> String {
    let total = value.chars().count();
    if total <= keep {
        return value.to_string();
    }
    let kept: String = value.chars().take(keep).collect();
    let masked = total.saturating_sub(keep);
    let mut out = String::with_capacity(kept.len().saturating_add(masked));
    out.push_str(&kept);
    for _ in 0..masked {
        out.push('*');
    }
    out
}

/// Compare two byte strings in constant time.
///
/// A length mismatch returns `false` immediately - lengths are public
/// information for the token formats Coffret uses (fixed 64-char hex).
/// Content comparison never short-circuits.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
