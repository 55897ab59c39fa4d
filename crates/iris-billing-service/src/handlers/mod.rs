//! API handlers.

pub mod accounts;
pub mod checkout;
pub mod health;
pub mod sessions;
pub mod webhooks;
