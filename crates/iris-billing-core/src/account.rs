//! Account types for iris-billing.
//!
//! An account is the entitlement state of one end user: which plan they are
//! on, whether their subscription is in good standing and how to find them
//! from a billing event.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::plan::PlanId;
use crate::UserId;

/// Entitlement state of one end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID (from the identity provider).
    pub user_id: UserId,

    /// Email address captured at signup.
    pub email: Option<String>,

    /// Current plan.
    pub plan_id: PlanId,

    /// Current subscription status.
    pub subscription_status: SubscriptionStatus,

    /// Plan label such as `pro_monthly`; cleared when the subscription ends.
    pub subscription_plan: Option<String>,

    /// End of the current paid period.
    pub subscription_expires_at: Option<DateTime<Utc>>,

    /// Stripe customer ID, used to resolve billing events to this account.
    pub stripe_customer_id: Option<String>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create the account of a freshly signed-up user: inactive, free plan.
    #[must_use]
    pub fn new(user_id: UserId, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email,
            plan_id: PlanId::free(),
            subscription_status: SubscriptionStatus::Inactive,
            subscription_plan: None,
            subscription_expires_at: None,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user currently holds paid entitlements.
    ///
    /// A cancelled subscription stays usable until its period ends.
    #[must_use]
    pub fn has_paid_access(&self) -> bool {
        matches!(
            self.subscription_status,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled
        )
    }

    /// Apply a partial update, bumping `updated_at`.
    pub fn apply(&mut self, update: &AccountUpdate) {
        if let Some(status) = update.subscription_status {
            self.subscription_status = status;
        }
        if let Some(label) = &update.subscription_plan {
            self.subscription_plan.clone_from(label);
        }
        if let Some(expires_at) = update.subscription_expires_at {
            self.subscription_expires_at = Some(expires_at);
        }
        if let Some(customer) = &update.stripe_customer_id {
            self.stripe_customer_id = Some(customer.clone());
        }
        if let Some(plan_id) = &update.plan_id {
            self.plan_id = plan_id.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Field-level changes to an account. `None` leaves a field untouched.
///
/// Writes touch only the fields a billing event is about, so two events for
/// the same account racing each other only conflict on fields they share.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    /// New subscription status.
    pub subscription_status: Option<SubscriptionStatus>,
    /// New plan label; `Some(None)` clears it.
    pub subscription_plan: Option<Option<String>>,
    /// New end of the paid period.
    pub subscription_expires_at: Option<DateTime<Utc>>,
    /// Billing-customer reference to record.
    pub stripe_customer_id: Option<String>,
    /// New plan.
    pub plan_id: Option<PlanId>,
}

impl AccountUpdate {
    /// An update that changes only the subscription status.
    #[must_use]
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            subscription_status: Some(status),
            ..Self::default()
        }
    }

    /// An update that changes only the plan.
    #[must_use]
    pub fn plan(plan_id: PlanId) -> Self {
        Self {
            plan_id: Some(plan_id),
            ..Self::default()
        }
    }

    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Status of an account's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,

    /// Cancelled by the customer (still active until period end).
    Cancelled,

    /// Payment failed or the subscription ended.
    Expired,

    /// Never subscribed, or the provider reports a status we don't act on.
    Inactive,
}

impl SubscriptionStatus {
    /// Status as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
        }
    }

    /// Map a Stripe subscription status onto ours.
    ///
    /// `active` → active, `canceled` → cancelled, `past_due` → expired,
    /// anything else (`incomplete`, `trialing`, `unpaid`, ...) → inactive.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "canceled" => Self::Cancelled,
            "past_due" => Self::Expired,
            _ => Self::Inactive,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            "inactive" => Ok(Self::Inactive),
            other => Err(BillingError::InvalidStatus(other.to_string())),
        }
    }
}
