//! In-memory storage implementation.
//!
//! Used when no database is configured and as the backing store of the
//! service's tests. State lives for the lifetime of the process.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use iris_billing_core::{Account, AccountUpdate, CreditBalance, CreditTransaction, UserId};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    balances: HashMap<UserId, CreditBalance>,
    transactions: Vec<CreditTransaction>,
}

/// Map-backed storage implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions recorded across all accounts.
    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }
}

/// The single account matching `pred`; ambiguous matches resolve to none.
fn single_match<'a>(
    accounts: impl Iterator<Item = &'a Account>,
    pred: impl Fn(&Account) -> bool,
    what: &str,
) -> Option<Account> {
    let mut matches = accounts.filter(|a| pred(a));
    let first = matches.next()?;
    if matches.next().is_some() {
        tracing::warn!(lookup = %what, "Multiple accounts match lookup, refusing to pick one");
        return None;
    }
    Some(first.clone())
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn insert_account(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.accounts.contains_key(&account.user_id) {
            return Err(StoreError::Conflict {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        inner.accounts.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(user_id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(single_match(
            inner.accounts.values(),
            |a| a.email.as_deref() == Some(email),
            "email",
        ))
    }

    async fn find_account_by_customer(&self, customer_id: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(single_match(
            inner.accounts.values(),
            |a| a.stripe_customer_id.as_deref() == Some(customer_id),
            "stripe_customer_id",
        ))
    }

    async fn update_account(
        &self,
        user_id: &UserId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>> {
        let mut inner = self.inner.write().await;
        Ok(inner.accounts.get_mut(user_id).map(|account| {
            account.apply(update);
            account.clone()
        }))
    }

    // =========================================================================
    // Credit Operations
    // =========================================================================

    async fn get_credit_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.inner.read().await.balances.get(user_id).cloned())
    }

    async fn replace_credit_balance(
        &self,
        balance: &CreditBalance,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.balances.insert(balance.user_id, balance.clone());
        inner.transactions.push(transaction.clone());
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let inner = self.inner.read().await;
        let mut txs: Vec<_> = inner
            .transactions
            .iter()
            .filter(|tx| tx.user_id == *user_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(txs.into_iter().skip(offset).take(limit).collect())
    }
}
