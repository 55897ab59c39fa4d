//! Entitlement reconciler.
//!
//! Translates billing lifecycle events into account and credit state:
//!
//! | Event | Account lookup | Status | Also |
//! |---|---|---|---|
//! | checkout completed (subscription) | metadata user id, else email | active | plan label, expiry, customer, plan; allocate |
//! | subscription updated | customer | mapped from provider | expiry, plan |
//! | subscription deleted | customer | expired | clear label, free plan; reset to free |
//! | invoice payment failed | customer | expired | |
//! | invoice paid (subscription) | customer | active | expiry, plan; allocate |
//!
//! Events for accounts that cannot be found are logged and dropped. Credit
//! allocation failures are logged and do not undo the account write that
//! preceded them.

use chrono::{DateTime, Utc};

use iris_billing_core::{
    plan_label, Account, AccountUpdate, BillingInterval, PlanCatalog, PlanId, PriceMap,
    SubscriptionStatus, UserId,
};
use iris_billing_store::{Store, StoreError};

use crate::ledger::CreditLedger;
use crate::provider::BillingProvider;
use crate::stripe::{BillingEvent, CheckoutSession, Invoice, StripeError, Subscription};

/// Metadata keys that may carry our user id on a checkout session, in
/// order of preference.
const USER_ID_METADATA_KEYS: [&str; 2] = ["user_id", "supabase_user_id"];

/// What reconciling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The account was updated.
    Applied {
        /// The account the event was applied to.
        user_id: UserId,
    },
    /// No account matched the event; nothing was written.
    AccountNotFound,
    /// The event carries nothing to act on.
    Skipped(&'static str),
    /// Event type the reconciler does not handle.
    Ignored,
}

/// An unexpected fault while reconciling.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Account store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Billing provider call failed.
    #[error("billing provider error: {0}")]
    Provider(#[from] StripeError),

    /// Subscription has no usable period end.
    #[error("subscription {subscription_id} has no valid current_period_end")]
    MissingPeriodEnd {
        /// The subscription.
        subscription_id: String,
    },
}

/// Resolve which plan a subscription grants.
///
/// A `plan_id` in the subscription's metadata always wins; one the catalog
/// does not know resolves to pro. Without metadata the first item's price
/// is looked up in the price map, again falling back to pro.
#[must_use]
pub fn resolve_plan_id(
    subscription: &Subscription,
    catalog: &PlanCatalog,
    prices: &PriceMap,
) -> PlanId {
    if let Some(raw) = subscription.metadata_value("plan_id") {
        return match PlanId::new(raw) {
            Ok(plan_id) if catalog.contains(&plan_id) => plan_id,
            _ => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    plan_id = %raw,
                    "Unknown plan_id in subscription metadata, using pro"
                );
                PlanId::pro()
            }
        };
    }

    subscription
        .first_price()
        .and_then(|price| prices.plan_for_price(&price.id))
        .unwrap_or_else(PlanId::pro)
}

/// Applies billing events to accounts.
pub struct Reconciler<'a> {
    store: &'a dyn Store,
    billing: &'a dyn BillingProvider,
    catalog: &'a PlanCatalog,
    prices: &'a PriceMap,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        billing: &'a dyn BillingProvider,
        catalog: &'a PlanCatalog,
        prices: &'a PriceMap,
    ) -> Self {
        Self {
            store,
            billing,
            catalog,
            prices,
        }
    }

    fn ledger(&self) -> CreditLedger<'a> {
        CreditLedger::new(self.store, self.catalog)
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns an error on store or provider faults. Unknown accounts and
    /// failed credit allocations are not errors.
    pub async fn reconcile(&self, event: &BillingEvent) -> Result<Reconciliation, ReconcileError> {
        match event {
            BillingEvent::CheckoutCompleted(session) => self.checkout_completed(session).await,
            BillingEvent::SubscriptionUpdated(sub) => self.subscription_updated(sub).await,
            BillingEvent::SubscriptionDeleted(sub) => self.subscription_deleted(sub).await,
            BillingEvent::InvoicePaymentFailed(invoice) => self.payment_failed(invoice).await,
            BillingEvent::InvoicePaid(invoice) => self.invoice_paid(invoice).await,
            BillingEvent::Unrecognized(kind) => {
                tracing::debug!(event_type = %kind, "Unhandled Stripe event");
                Ok(Reconciliation::Ignored)
            }
        }
    }

    async fn checkout_completed(
        &self,
        session: &CheckoutSession,
    ) -> Result<Reconciliation, ReconcileError> {
        let subscription_ref = match &session.subscription {
            Some(sub) if session.is_subscription() => sub,
            _ => return Ok(Reconciliation::Skipped("checkout did not start a subscription")),
        };

        let subscription = self
            .billing
            .retrieve_subscription(subscription_ref.id())
            .await?;

        let Some(account) = self.checkout_account(session).await? else {
            tracing::warn!(
                session_id = %session.id,
                email = ?session.email(),
                "No account found for completed checkout"
            );
            return Ok(Reconciliation::AccountNotFound);
        };

        let plan_id = resolve_plan_id(&subscription, self.catalog, self.prices);
        let interval =
            BillingInterval::from_price_label(session.metadata_value("plan").unwrap_or("MONTHLY"));
        let period_end = period_end(&subscription)?;

        let update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::Active),
            subscription_plan: Some(Some(plan_label(&plan_id, interval))),
            subscription_expires_at: Some(period_end),
            stripe_customer_id: session.customer.clone(),
            plan_id: Some(plan_id.clone()),
        };
        if self.store.update_account(&account.user_id, &update).await?.is_none() {
            return Ok(Reconciliation::AccountNotFound);
        }
        tracing::info!(user_id = %account.user_id, plan_id = %plan_id, "Subscription started");

        self.allocate(account.user_id, &plan_id, period_end).await;
        Ok(Reconciliation::Applied {
            user_id: account.user_id,
        })
    }

    async fn subscription_updated(
        &self,
        subscription: &Subscription,
    ) -> Result<Reconciliation, ReconcileError> {
        let Some(account) = self.customer_account(subscription.customer.as_deref()).await? else {
            return Ok(Reconciliation::AccountNotFound);
        };

        let status = SubscriptionStatus::from_provider(&subscription.status);
        let update = AccountUpdate {
            subscription_status: Some(status),
            subscription_expires_at: Some(period_end(subscription)?),
            plan_id: Some(resolve_plan_id(subscription, self.catalog, self.prices)),
            ..AccountUpdate::default()
        };

        self.apply(&account, &update, "Subscription updated").await
    }

    async fn subscription_deleted(
        &self,
        subscription: &Subscription,
    ) -> Result<Reconciliation, ReconcileError> {
        let Some(account) = self.customer_account(subscription.customer.as_deref()).await? else {
            return Ok(Reconciliation::AccountNotFound);
        };

        let update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::Expired),
            subscription_plan: Some(None),
            plan_id: Some(PlanId::free()),
            ..AccountUpdate::default()
        };
        let outcome = self.apply(&account, &update, "Subscription ended").await?;

        if matches!(outcome, Reconciliation::Applied { .. }) {
            if let Err(e) = self.ledger().reset_to_free(account.user_id).await {
                tracing::error!(user_id = %account.user_id, error = %e, "Failed to reset credits to free tier");
            }
        }
        Ok(outcome)
    }

    async fn payment_failed(&self, invoice: &Invoice) -> Result<Reconciliation, ReconcileError> {
        let Some(account) = self.customer_account(invoice.customer.as_deref()).await? else {
            return Ok(Reconciliation::AccountNotFound);
        };

        self.apply(
            &account,
            &AccountUpdate::status(SubscriptionStatus::Expired),
            "Invoice payment failed",
        )
        .await
    }

    async fn invoice_paid(&self, invoice: &Invoice) -> Result<Reconciliation, ReconcileError> {
        let Some(subscription_id) = invoice.subscription.as_deref() else {
            return Ok(Reconciliation::Skipped("invoice is not for a subscription"));
        };

        let subscription = self.billing.retrieve_subscription(subscription_id).await?;

        let Some(account) = self.customer_account(invoice.customer.as_deref()).await? else {
            return Ok(Reconciliation::AccountNotFound);
        };

        let plan_id = resolve_plan_id(&subscription, self.catalog, self.prices);
        let period_end = period_end(&subscription)?;
        let update = AccountUpdate {
            subscription_status: Some(SubscriptionStatus::Active),
            subscription_expires_at: Some(period_end),
            plan_id: Some(plan_id.clone()),
            ..AccountUpdate::default()
        };
        let outcome = self.apply(&account, &update, "Subscription renewed").await?;

        if matches!(outcome, Reconciliation::Applied { .. }) {
            self.allocate(account.user_id, &plan_id, period_end).await;
        }
        Ok(outcome)
    }

    /// Find the account a completed checkout belongs to.
    ///
    /// A well-formed user id in the metadata is authoritative; a malformed
    /// one falls through to the email lookup.
    async fn checkout_account(
        &self,
        session: &CheckoutSession,
    ) -> Result<Option<Account>, StoreError> {
        let raw_user_id = USER_ID_METADATA_KEYS
            .iter()
            .find_map(|key| session.metadata_value(key));

        if let Some(raw) = raw_user_id {
            match raw.parse::<UserId>() {
                Ok(user_id) => return self.store.get_account(&user_id).await,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, user_id = %raw, error = %e, "Malformed user id in checkout metadata");
                }
            }
        }

        match session.email() {
            Some(email) => self.store.find_account_by_email(email).await,
            None => Ok(None),
        }
    }

    async fn customer_account(&self, customer: Option<&str>) -> Result<Option<Account>, StoreError> {
        let Some(customer) = customer else {
            tracing::warn!("Billing event has no customer reference");
            return Ok(None);
        };

        let account = self.store.find_account_by_customer(customer).await?;
        if account.is_none() {
            tracing::warn!(customer_id = %customer, "No account for billing customer");
        }
        Ok(account)
    }

    async fn apply(
        &self,
        account: &Account,
        update: &AccountUpdate,
        what: &str,
    ) -> Result<Reconciliation, ReconcileError> {
        match self.store.update_account(&account.user_id, update).await? {
            Some(updated) => {
                tracing::info!(
                    user_id = %updated.user_id,
                    status = %updated.subscription_status,
                    plan_id = %updated.plan_id,
                    "{what}"
                );
                Ok(Reconciliation::Applied {
                    user_id: updated.user_id,
                })
            }
            None => Ok(Reconciliation::AccountNotFound),
        }
    }

    async fn allocate(&self, user_id: UserId, plan_id: &PlanId, cycle_end_at: DateTime<Utc>) {
        if let Err(e) = self.ledger().allocate(user_id, plan_id, cycle_end_at).await {
            tracing::error!(user_id = %user_id, plan_id = %plan_id, error = %e, "Credit allocation failed");
        }
    }
}

fn period_end(subscription: &Subscription) -> Result<DateTime<Utc>, ReconcileError> {
    subscription
        .period_end()
        .ok_or_else(|| ReconcileError::MissingPeriodEnd {
            subscription_id: subscription.id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use iris_billing_core::PriceKey;

    use super::*;
    use crate::stripe::{Price, StripeList, SubscriptionItem};

    fn subscription(metadata_plan: Option<&str>, price_id: &str) -> Subscription {
        Subscription {
            id: "sub_1".into(),
            customer: Some("cus_1".into()),
            status: "active".into(),
            current_period_end: Some(1_767_225_600),
            metadata: metadata_plan
                .map(|p| HashMap::from([("plan_id".to_string(), p.to_string())]))
                .unwrap_or_default(),
            items: StripeList {
                data: vec![SubscriptionItem {
                    id: Some("si_1".into()),
                    price: Price {
                        id: price_id.into(),
                        recurring: None,
                    },
                }],
                has_more: false,
            },
        }
    }

    fn prices() -> PriceMap {
        PriceMap::new()
            .with_price(PriceKey::Monthly, "price_pro_m")
            .with_price(PriceKey::PractitionerYearly, "price_prac_y")
    }

    #[test]
    fn metadata_plan_wins_over_price() {
        let catalog = PlanCatalog::default();
        let sub = subscription(Some("practitioner"), "price_pro_m");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::practitioner());

        let sub = subscription(Some("pro"), "price_prac_y");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::pro());
    }

    #[test]
    fn metadata_plan_wins_over_fallback() {
        let catalog = PlanCatalog::default();
        let sub = subscription(Some("practitioner"), "price_unknown");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::practitioner());
    }

    #[test]
    fn recognized_price_wins_over_fallback() {
        let catalog = PlanCatalog::default();
        let sub = subscription(None, "price_prac_y");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::practitioner());
    }

    #[test]
    fn unrecognized_price_falls_back_to_pro() {
        let catalog = PlanCatalog::default();
        let sub = subscription(None, "price_unknown");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::pro());

        let mut sub = subscription(None, "unused");
        sub.items.data.clear();
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::pro());
    }

    #[test]
    fn unknown_metadata_plan_falls_back_to_pro_not_price() {
        let catalog = PlanCatalog::default();
        let sub = subscription(Some("enterprise"), "price_prac_y");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::pro());
    }

    #[test]
    fn blank_metadata_plan_counts_as_absent() {
        let catalog = PlanCatalog::default();
        let sub = subscription(Some("  "), "price_prac_y");
        assert_eq!(resolve_plan_id(&sub, &catalog, &prices()), PlanId::practitioner());
    }

    #[test]
    fn missing_period_end_is_a_fault() {
        let mut sub = subscription(None, "price_pro_m");
        sub.current_period_end = None;
        assert!(matches!(
            period_end(&sub),
            Err(ReconcileError::MissingPeriodEnd { .. })
        ));
    }
}
