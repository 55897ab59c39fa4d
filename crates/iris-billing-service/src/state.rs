//! Application state.

use std::sync::Arc;

use iris_billing_core::{PlanCatalog, PriceMap};
use iris_billing_store::Store;

use crate::config::ServiceConfig;
use crate::provider::BillingProvider;
use crate::reconciler::Reconciler;
use crate::stripe::WebhookVerifier;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// The billing provider.
    pub billing: Arc<dyn BillingProvider>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Plans and their allotments.
    pub catalog: PlanCatalog,

    /// Configured provider prices.
    pub prices: PriceMap,

    /// Webhook signature verifier.
    pub verifier: WebhookVerifier,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn Store>,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        let verifier = WebhookVerifier::new(
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_seconds,
        );
        if !verifier.is_configured() {
            tracing::warn!("Stripe webhook secret not configured - all webhooks will be rejected");
        }

        let prices = config.price_map();
        if prices.is_empty() {
            tracing::warn!("No Stripe prices configured - checkout and price-based plan lookup disabled");
        }

        if config.auth_jwt_secret.is_none() {
            tracing::warn!("AUTH_JWT_SECRET not configured - user endpoints will reject all requests");
        }

        Self {
            store,
            billing,
            config,
            catalog: PlanCatalog::default(),
            prices,
            verifier,
        }
    }

    /// The reconciler over this state's store and provider.
    #[must_use]
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            self.store.as_ref(),
            self.billing.as_ref(),
            &self.catalog,
            &self.prices,
        )
    }
}
