//! iris-billing HTTP service.
//!
//! Reconciles Stripe subscription lifecycle events into account entitlement
//! state (subscription status, plan, credit balance) and serves the
//! checkout flow around it:
//!
//! - Signed webhook intake and reconciliation
//! - Checkout session creation and verification
//! - Account registration and read-only account/credit views
//!
//! # Authentication
//!
//! 1. **Identity-provider JWTs** (HS256) - for end-user requests
//! 2. **Service API key** - for the signup hook
//! 3. **Stripe signatures** - for webhooks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod provider;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{AllocationError, CreditLedger};
pub use provider::BillingProvider;
pub use reconciler::{Reconciler, Reconciliation, ReconcileError};
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
