//! `X-VERIFY` checksums.
//!
//! PhonePe signs every request and callback with
//! `sha256_hex(payload + salt_key) + "###" + salt_index`, where `payload` is
//! the base64 body plus the API path for requests, the API path alone for
//! status checks, and the base64 `response` field for callbacks.

use sha2::{Digest, Sha256};

/// Compute the `X-VERIFY` value for `payload`.
#[must_use]
pub fn x_verify(payload: &str, salt_key: &str, salt_index: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(salt_key.as_bytes());
    format!("{}###{salt_index}", hex::encode(hasher.finalize()))
}

/// Check a received `X-VERIFY` header against `payload`.
#[must_use]
pub fn verify(payload: &str, header: &str, salt_key: &str, salt_index: u32) -> bool {
    let expected = x_verify(payload, salt_key, salt_index);
    constant_time_compare(&expected, header.trim())
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
