//! Error types for iris-billing.

use crate::ids::IdError;

/// Result type for iris-billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in iris-billing domain operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Plan id not in the catalog.
    #[error("plan not found: {plan_id}")]
    PlanNotFound {
        /// The plan id that was looked up.
        plan_id: String,
    },

    /// Stored subscription status is not one we know.
    #[error("invalid subscription status: {0}")]
    InvalidStatus(String),

    /// Stored transaction type is not one we know.
    #[error("invalid transaction type: {0}")]
    InvalidTransactionType(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
