//! Credit ledger: cycle allocations and free-tier resets.
//!
//! Allocation replaces the account's balance outright (no rollover) and
//! appends one transaction per call, so repeating a call converges on the
//! same balance while the log grows.

use chrono::{DateTime, Utc};

use iris_billing_core::{
    AccountUpdate, BillingError, CreditBalance, CreditTransaction, PlanCatalog, PlanId, UserId,
};
use iris_billing_store::{Store, StoreError};

/// Why an allocation did not happen.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// The plan is not in the catalog.
    #[error(transparent)]
    UnknownPlan(#[from] BillingError),

    /// The balance could not be written.
    #[error("credit balance write failed: {0}")]
    Store(#[from] StoreError),
}

/// Writes credit balances and their audit trail.
#[derive(Clone, Copy)]
pub struct CreditLedger<'a> {
    store: &'a dyn Store,
    catalog: &'a PlanCatalog,
}

impl<'a> CreditLedger<'a> {
    /// Create a ledger over a store and catalog.
    #[must_use]
    pub fn new(store: &'a dyn Store, catalog: &'a PlanCatalog) -> Self {
        Self { store, catalog }
    }

    /// Grant a plan's full allotment for a cycle ending at `cycle_end_at`.
    ///
    /// Also points the account at `plan_id`; a failure there is logged and
    /// does not fail the allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is unknown or the balance write fails.
    /// Nothing is written in either case.
    pub async fn allocate(
        &self,
        user_id: UserId,
        plan_id: &PlanId,
        cycle_end_at: DateTime<Utc>,
    ) -> Result<CreditBalance, AllocationError> {
        let plan = self.catalog.get(plan_id)?;

        let balance = CreditBalance::allocation(user_id, plan, Utc::now(), cycle_end_at);
        let transaction = CreditTransaction::allocation(&balance, &plan.name);
        self.store.replace_credit_balance(&balance, &transaction).await?;

        self.set_account_plan(user_id, plan_id).await;

        tracing::info!(
            user_id = %user_id,
            plan_id = %plan_id,
            credits = balance.credits_total,
            cycle_end_at = %cycle_end_at,
            "Allocated credits"
        );
        Ok(balance)
    }

    /// Drop an account back to the free tier: one credit for thirty days.
    ///
    /// # Errors
    ///
    /// Returns an error if the balance write fails.
    pub async fn reset_to_free(&self, user_id: UserId) -> Result<CreditBalance, AllocationError> {
        let balance = CreditBalance::free_tier(user_id, Utc::now());
        let transaction = CreditTransaction::free_tier_reset(&balance);
        self.store.replace_credit_balance(&balance, &transaction).await?;

        self.set_account_plan(user_id, &PlanId::free()).await;

        tracing::info!(user_id = %user_id, "Reset to free tier");
        Ok(balance)
    }

    async fn set_account_plan(&self, user_id: UserId, plan_id: &PlanId) {
        match self
            .store
            .update_account(&user_id, &AccountUpdate::plan(plan_id.clone()))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "No account to record plan on");
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, plan_id = %plan_id, error = %e, "Failed to record plan on account");
            }
        }
    }
}
