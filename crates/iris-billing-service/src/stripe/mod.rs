//! Stripe integration.
//!
//! Stripe handles:
//! - Subscription checkout
//! - Subscription lifecycle events (delivered as signed webhooks)
//! - Session lookups for the post-checkout confirmation screen

pub mod client;
pub mod events;
pub mod signature;
pub mod types;

pub use client::{StripeClient, StripeError};
pub use events::{BillingEvent, WebhookEnvelope};
pub use signature::{signature_header, SignatureError, WebhookVerifier, DEFAULT_TOLERANCE_SECONDS};
pub use types::*;
