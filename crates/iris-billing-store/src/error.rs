//! Error types for iris-billing storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be mapped onto a domain type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record already exists.
    #[error("{entity} already exists: {id}")]
    Conflict {
        /// Kind of record.
        entity: &'static str,
        /// Conflicting key.
        id: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<iris_billing_core::BillingError> for StoreError {
    fn from(err: iris_billing_core::BillingError) -> Self {
        Self::Serialization(err.to_string())
    }
}
