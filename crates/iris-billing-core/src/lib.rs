//! Core types for iris-billing.
//!
//! This crate provides the domain types shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Plans**: `PlanId`, `Plan`, `PlanCatalog`, `PriceKey`, `PriceMap`
//! - **Accounts**: `Account`, `AccountUpdate`, `SubscriptionStatus`
//! - **Credits**: `CreditBalance`, `CreditTransaction`, `TransactionType`
//!
//! # Credits
//!
//! **1 credit = 1 iris scan.** Each billing cycle replaces the balance with
//! the plan's allotment; nothing carries over.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod plan;

pub use account::{Account, AccountUpdate, SubscriptionStatus};
pub use credits::{CreditBalance, CreditTransaction, TransactionType, FREE_CYCLE_DAYS};
pub use error::{BillingError, Result};
pub use ids::{IdError, TransactionId, UserId};
pub use plan::{
    plan_label, BillingInterval, Plan, PlanCatalog, PlanId, PriceKey, PriceMap,
    FREE_PLAN_CREDITS, PRACTITIONER_PLAN_CREDITS, PRO_PLAN_CREDITS,
};
