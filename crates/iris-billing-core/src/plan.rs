//! Plan catalog and price mapping.
//!
//! The catalog is static at runtime. Price ids are assigned by the billing
//! provider per deployment, so the price map is assembled from configuration
//! at startup.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BillingError;
use crate::ids::IdError;

// ============================================================================
// Constants
// ============================================================================

/// Free tier monthly credit allowance.
pub const FREE_PLAN_CREDITS: i64 = 1;

/// Pro plan monthly credit allowance.
pub const PRO_PLAN_CREDITS: i64 = 30;

/// Practitioner plan monthly credit allowance.
pub const PRACTITIONER_PLAN_CREDITS: i64 = 200;

/// A plan identifier ("free", "pro", "practitioner", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanId(String);

impl PlanId {
    /// Identifier of the free tier.
    pub const FREE: &'static str = "free";
    /// Identifier of the pro plan; also the fallback for unresolvable plans.
    pub const PRO: &'static str = "pro";
    /// Identifier of the practitioner plan.
    pub const PRACTITIONER: &'static str = "practitioner";

    /// Create a plan id, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns `IdError::Empty` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The free tier id.
    #[must_use]
    pub fn free() -> Self {
        Self(Self::FREE.to_string())
    }

    /// The pro plan id.
    #[must_use]
    pub fn pro() -> Self {
        Self(Self::PRO.to_string())
    }

    /// The practitioner plan id.
    #[must_use]
    pub fn practitioner() -> Self {
        Self(Self::PRACTITIONER.to_string())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the free tier.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.0 == Self::FREE
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PlanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PlanId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanId> for String {
    fn from(id: PlanId) -> Self {
        id.0
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Credits granted at the start of every billing cycle.
    pub monthly_credits: i64,
    /// Human-readable name.
    pub name: String,
}

impl Plan {
    /// Create a catalog entry.
    #[must_use]
    pub fn new(id: PlanId, monthly_credits: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            monthly_credits,
            name: name.into(),
        }
    }
}

/// Read-only lookup from plan id to plan.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, Plan>,
}

impl PlanCatalog {
    /// Build a catalog from explicit entries.
    pub fn from_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Look up a plan.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::PlanNotFound` for ids the catalog doesn't know.
    pub fn get(&self, id: &PlanId) -> Result<&Plan, BillingError> {
        self.plans.get(id).ok_or_else(|| BillingError::PlanNotFound {
            plan_id: id.to_string(),
        })
    }

    /// Whether the catalog knows this id.
    #[must_use]
    pub fn contains(&self, id: &PlanId) -> bool {
        self.plans.contains_key(id)
    }

    /// Look up a plan, falling back to the pro plan for unknown ids.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::PlanNotFound` only if the pro plan itself is
    /// missing from the catalog.
    pub fn get_or_pro(&self, id: &PlanId) -> Result<&Plan, BillingError> {
        self.get(id).or_else(|_| self.get(&PlanId::pro()))
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::from_plans([
            Plan::new(PlanId::free(), FREE_PLAN_CREDITS, "Free"),
            Plan::new(PlanId::pro(), PRO_PLAN_CREDITS, "Pro"),
            Plan::new(
                PlanId::practitioner(),
                PRACTITIONER_PLAN_CREDITS,
                "Practitioner",
            ),
        ])
    }
}

/// Billing cadence of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    /// Billed every month.
    Monthly,
    /// Billed every year.
    Yearly,
}

impl BillingInterval {
    /// Interval as used in plan labels and API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Interval named by a checkout's `plan` metadata ("MONTHLY", "YEARLY",
    /// "PRACTITIONER_YEARLY", ...).
    #[must_use]
    pub fn from_price_label(label: &str) -> Self {
        if label.contains("YEARLY") {
            Self::Yearly
        } else {
            Self::Monthly
        }
    }

    /// Interval from the provider's recurring interval ("month", "year").
    #[must_use]
    pub fn from_recurring(interval: Option<&str>) -> Self {
        if interval == Some("year") {
            Self::Yearly
        } else {
            Self::Monthly
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the account's plan label, e.g. `pro_yearly`.
#[must_use]
pub fn plan_label(plan_id: &PlanId, interval: BillingInterval) -> String {
    format!("{plan_id}_{interval}")
}

/// The purchasable prices offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceKey {
    /// Pro, billed monthly.
    Monthly,
    /// Pro, billed yearly.
    Yearly,
    /// Practitioner, billed monthly.
    PractitionerMonthly,
    /// Practitioner, billed yearly.
    PractitionerYearly,
}

impl PriceKey {
    /// Every price key.
    pub const ALL: [Self; 4] = [
        Self::Monthly,
        Self::Yearly,
        Self::PractitionerMonthly,
        Self::PractitionerYearly,
    ];

    /// The key as written into checkout metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
            Self::PractitionerMonthly => "PRACTITIONER_MONTHLY",
            Self::PractitionerYearly => "PRACTITIONER_YEARLY",
        }
    }

    /// The plan this price grants.
    #[must_use]
    pub fn plan_id(self) -> PlanId {
        match self {
            Self::Monthly | Self::Yearly => PlanId::pro(),
            Self::PractitionerMonthly | Self::PractitionerYearly => PlanId::practitioner(),
        }
    }

    /// The billing cadence of this price.
    #[must_use]
    pub const fn interval(self) -> BillingInterval {
        match self {
            Self::Monthly | Self::PractitionerMonthly => BillingInterval::Monthly,
            Self::Yearly | Self::PractitionerYearly => BillingInterval::Yearly,
        }
    }
}

impl fmt::Display for PriceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured provider price ids, keyed by [`PriceKey`].
#[derive(Debug, Clone, Default)]
pub struct PriceMap {
    prices: HashMap<PriceKey, String>,
}

impl PriceMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider price id for a key. Blank ids are ignored.
    #[must_use]
    pub fn with_price(mut self, key: PriceKey, price_id: impl Into<String>) -> Self {
        let price_id = price_id.into();
        if !price_id.trim().is_empty() {
            self.prices.insert(key, price_id);
        }
        self
    }

    /// Provider price id configured for a key.
    #[must_use]
    pub fn price_id(&self, key: PriceKey) -> Option<&str> {
        self.prices.get(&key).map(String::as_str)
    }

    /// Plan granted by a provider price id, if it is one of ours.
    #[must_use]
    pub fn plan_for_price(&self, price_id: &str) -> Option<PlanId> {
        self.prices
            .iter()
            .find(|(_, id)| id.as_str() == price_id)
            .map(|(key, _)| key.plan_id())
    }

    /// Number of configured prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no price is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
