//! Storage layer for iris-billing.
//!
//! This crate provides persistence for accounts, credit balances and the
//! credit transaction log behind the [`Store`] trait, with two backends:
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`, the production backend
//! - [`MemoryStore`]: in-process maps, for development and tests
//!
//! # Consistency
//!
//! Every write is atomic per row. Replacing a credit balance and appending its
//! transaction happen together in [`Store::replace_credit_balance`]; account
//! updates are separate writes, so an account and its balance can diverge if a
//! fault lands between the two.
//!
//! # Example
//!
//! ```
//! use iris_billing_core::{Account, UserId};
//! use iris_billing_store::{MemoryStore, Store};
//!
//! # async fn example() -> iris_billing_store::Result<()> {
//! let store = MemoryStore::new();
//! let account = Account::new(UserId::generate(), Some("user@example.com".into()));
//! store.insert_account(&account).await?;
//!
//! let found = store.find_account_by_email("user@example.com").await?;
//! assert_eq!(found.map(|a| a.user_id), Some(account.user_id));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use iris_billing_core::{Account, AccountUpdate, CreditBalance, CreditTransaction, UserId};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the service can run against
/// PostgreSQL in production and an in-memory map in tests.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if an account with this id exists.
    async fn insert_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Find the account registered with an email address.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Find the account holding a Stripe customer reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_account_by_customer(&self, customer_id: &str) -> Result<Option<Account>>;

    /// Apply a field-level update to an account.
    ///
    /// Returns the updated account, or `None` if no account has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn update_account(
        &self,
        user_id: &UserId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>>;

    // =========================================================================
    // Credit Operations
    // =========================================================================

    /// Get the credit balance of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_credit_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>>;

    /// Replace an account's credit balance and append the transaction that
    /// records it, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written
    /// in that case.
    async fn replace_credit_balance(
        &self,
        balance: &CreditBalance,
        transaction: &CreditTransaction,
    ) -> Result<()>;

    /// List transactions for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;
}
