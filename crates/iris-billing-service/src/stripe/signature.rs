//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signature is HMAC-SHA256 over `"{t}.{body}"` keyed with the endpoint's
//! signing secret; any one matching `v1` entry authenticates the payload.

use chrono::Utc;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Default maximum age of a signed timestamp, in seconds.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

/// Why a payload failed verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No signing secret is configured.
    #[error("webhook secret not configured")]
    NotConfigured,

    /// Header has no usable `t=` entry.
    #[error("malformed signature header")]
    MalformedHeader,

    /// Header carries no `v1=` entry.
    #[error("no v1 signature in header")]
    NoSignatures,

    /// Signed timestamp is too far from now.
    #[error("timestamp outside tolerance: {age}s")]
    OutsideTolerance {
        /// Seconds between the signed timestamp and now.
        age: i64,
    },

    /// No signature matched.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies the authenticity of webhook payloads.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_seconds: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("configured", &self.is_configured())
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

impl WebhookVerifier {
    /// Create a verifier. A blank secret counts as not configured.
    #[must_use]
    pub fn new(secret: Option<String>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_seconds,
        }
    }

    /// Whether a signing secret is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify `payload` against the header value, using the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first check that failed.
    pub fn verify(&self, payload: &str, header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify `payload` against the header value as of `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first check that failed.
    pub fn verify_at(&self, payload: &str, header: &str, now: i64) -> Result<(), SignatureError> {
        let secret = self.secret.as_ref().ok_or(SignatureError::NotConfigured)?;

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", ts)) => {
                    timestamp = Some(ts.parse().map_err(|_| SignatureError::MalformedHeader)?);
                }
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignatures);
        }

        let expected = hmac_sha256_hex(secret.as_bytes(), format!("{timestamp}.{payload}").as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;

        if !signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
            return Err(SignatureError::Mismatch);
        }

        let age = now - timestamp;
        if self.tolerance_seconds > 0 && age.abs() > self.tolerance_seconds {
            return Err(SignatureError::OutsideTolerance { age });
        }

        Ok(())
    }
}

/// Build a `Stripe-Signature` header value for `payload` signed at `timestamp`.
///
/// This is what the provider sends; the service uses it only in tests and
/// local tooling.
#[must_use]
pub fn signature_header(secret: &str, timestamp: i64, payload: &str) -> String {
    let sig = hmac_sha256_hex(secret.as_bytes(), format!("{timestamp}.{payload}").as_bytes())
        .unwrap_or_default();
    format!("t={timestamp},v1={sig}")
}
