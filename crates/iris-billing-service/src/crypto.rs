//! Cryptographic helpers for webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `message` and return it hex-encoded (64 chars).
///
/// # Errors
///
/// Returns `InvalidLength` if the key is rejected. HMAC accepts keys of any
/// length, so this does not happen with the `hmac` crate as shipped.
pub fn hmac_sha256_hex(
    secret: &[u8],
    message: &[u8],
) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison.
///
/// Runs in time dependent only on the length of the inputs, not on where
/// they first differ.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
