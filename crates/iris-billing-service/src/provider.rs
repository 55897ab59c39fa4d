//! The billing provider seam.

use async_trait::async_trait;

use crate::stripe::{CheckoutSession, NewCheckoutSession, StripeError, Subscription};

/// Read and write access to the hosted billing provider.
///
/// Implemented by [`StripeClient`](crate::stripe::StripeClient); tests swap
/// in fakes.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Fetch a subscription.
    async fn retrieve_subscription(&self, subscription_id: &str)
        -> Result<Subscription, StripeError>;

    /// Fetch a Checkout session with its subscription expanded.
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError>;

    /// Start a subscription Checkout session.
    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError>;
}
