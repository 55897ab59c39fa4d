//! Credit balance and transaction types for iris-billing.
//!
//! One credit is one scan. Balances are replenished per billing cycle by
//! replacement; unused credits never roll over.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Plan, PlanId, FREE_PLAN_CREDITS};
use crate::{TransactionId, UserId};

/// Length of the free tier's cycle, counted from the reset.
pub const FREE_CYCLE_DAYS: i64 = 30;

/// Current credit balance of an account (one record per account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Owning account.
    pub user_id: UserId,

    /// Credits left in this cycle.
    pub credits_remaining: i64,

    /// Allotment at the start of this cycle.
    pub credits_total: i64,

    /// Plan that produced the allotment.
    pub plan_id: PlanId,

    /// Start of the cycle.
    pub cycle_start_at: DateTime<Utc>,

    /// End of the cycle.
    pub cycle_end_at: DateTime<Utc>,

    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    /// A fresh cycle with the plan's full allotment.
    #[must_use]
    pub fn allocation(
        user_id: UserId,
        plan: &Plan,
        now: DateTime<Utc>,
        cycle_end_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            credits_remaining: plan.monthly_credits,
            credits_total: plan.monthly_credits,
            plan_id: plan.id.clone(),
            cycle_start_at: now,
            cycle_end_at,
            updated_at: now,
        }
    }

    /// The free tier: one credit for a thirty-day window from `now`.
    #[must_use]
    pub fn free_tier(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            credits_remaining: FREE_PLAN_CREDITS,
            credits_total: FREE_PLAN_CREDITS,
            plan_id: PlanId::free(),
            cycle_start_at: now,
            cycle_end_at: now + Duration::days(FREE_CYCLE_DAYS),
            updated_at: now,
        }
    }
}

/// An immutable audit record of a balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Credits added.
    pub amount: i64,

    /// Balance after this transaction.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Record a cycle allocation for a plan.
    #[must_use]
    pub fn allocation(balance: &CreditBalance, plan_name: &str) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id: balance.user_id,
            transaction_type: TransactionType::Allocation,
            amount: balance.credits_total,
            balance_after: balance.credits_remaining,
            description: format!("Monthly credit allocation for {plan_name} plan"),
            created_at: balance.updated_at,
        }
    }

    /// Record the reset to the free tier after a subscription ended.
    #[must_use]
    pub fn free_tier_reset(balance: &CreditBalance) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id: balance.user_id,
            transaction_type: TransactionType::Allocation,
            amount: balance.credits_total,
            balance_after: balance.credits_remaining,
            description: "Reset to free tier after subscription cancellation".to_string(),
            created_at: balance.updated_at,
        }
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// A balance replaced by a cycle allocation.
    Allocation,
}

impl TransactionType {
    /// Type as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = crate::BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allocation" => Ok(Self::Allocation),
            other => Err(crate::BillingError::InvalidTransactionType(other.to_string())),
        }
    }
}
