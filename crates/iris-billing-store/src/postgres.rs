//! PostgreSQL storage implementation.
//!
//! Queries are checked at runtime (no compile-time database connection). The
//! schema is embedded from `migrations/` and applied with [`PgStore::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use iris_billing_core::{
    Account, AccountUpdate, CreditBalance, CreditTransaction, PlanId, TransactionId, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Maximum pooled connections.
const MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn single_account(&self, column: &'static str, value: &str) -> Result<Option<Account>> {
        // `column` is one of our own column names, never user input.
        let sql = format!("SELECT * FROM profiles WHERE {column} = $1 LIMIT 2");
        let rows: Vec<AccountRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        if rows.len() > 1 {
            tracing::warn!(lookup = %column, "Multiple accounts match lookup, refusing to pick one");
            return Ok(None);
        }
        rows.into_iter().next().map(Account::try_from).transpose()
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: uuid::Uuid,
    email: Option<String>,
    plan_id: String,
    subscription_status: String,
    subscription_plan: Option<String>,
    subscription_expires_at: Option<DateTime<Utc>>,
    stripe_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            user_id: UserId::from_uuid(row.id),
            email: row.email,
            plan_id: PlanId::new(row.plan_id).map_err(iris_billing_core::BillingError::from)?,
            subscription_status: row.subscription_status.parse()?,
            subscription_plan: row.subscription_plan,
            subscription_expires_at: row.subscription_expires_at,
            stripe_customer_id: row.stripe_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    user_id: uuid::Uuid,
    credits_remaining: i64,
    credits_total: i64,
    plan_id: String,
    cycle_start_at: DateTime<Utc>,
    cycle_end_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BalanceRow> for CreditBalance {
    type Error = StoreError;

    fn try_from(row: BalanceRow) -> Result<Self> {
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            credits_remaining: row.credits_remaining,
            credits_total: row.credits_total,
            plan_id: PlanId::new(row.plan_id).map_err(iris_billing_core::BillingError::from)?,
            cycle_start_at: row.cycle_start_at,
            cycle_end_at: row.cycle_end_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    user_id: uuid::Uuid,
    transaction_type: String,
    amount: i64,
    balance_after: i64,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .parse::<TransactionId>()
                .map_err(iris_billing_core::BillingError::from)?,
            user_id: UserId::from_uuid(row.user_id),
            transaction_type: row.transaction_type.parse()?,
            amount: row.amount,
            balance_after: row.balance_after,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn insert_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO profiles (id, email, plan_id, subscription_status, subscription_plan, \
             subscription_expires_at, stripe_customer_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(account.user_id.as_uuid())
        .bind(account.email.as_deref())
        .bind(account.plan_id.as_str())
        .bind(account.subscription_status.as_str())
        .bind(account.subscription_plan.as_deref())
        .bind(account.subscription_expires_at)
        .bind(account.stripe_customer_id.as_deref())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                entity: "account",
                id: account.user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.single_account("email", email).await
    }

    async fn find_account_by_customer(&self, customer_id: &str) -> Result<Option<Account>> {
        self.single_account("stripe_customer_id", customer_id).await
    }

    async fn update_account(
        &self,
        user_id: &UserId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "UPDATE profiles SET \
             subscription_status = COALESCE($2, subscription_status), \
             subscription_plan = CASE WHEN $3 THEN $4 ELSE subscription_plan END, \
             subscription_expires_at = COALESCE($5, subscription_expires_at), \
             stripe_customer_id = COALESCE($6, stripe_customer_id), \
             plan_id = COALESCE($7, plan_id), \
             updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(user_id.as_uuid())
        .bind(update.subscription_status.map(|s| s.as_str()))
        .bind(update.subscription_plan.is_some())
        .bind(update.subscription_plan.clone().flatten())
        .bind(update.subscription_expires_at)
        .bind(update.stripe_customer_id.as_deref())
        .bind(update.plan_id.as_ref().map(PlanId::as_str))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Account::try_from).transpose()
    }

    // =========================================================================
    // Credit Operations
    // =========================================================================

    async fn get_credit_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        let row: Option<BalanceRow> =
            sqlx::query_as("SELECT * FROM user_credits WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(CreditBalance::try_from).transpose()
    }

    async fn replace_credit_balance(
        &self,
        balance: &CreditBalance,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_credits (user_id, credits_remaining, credits_total, plan_id, \
             cycle_start_at, cycle_end_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id) DO UPDATE SET \
             credits_remaining = EXCLUDED.credits_remaining, \
             credits_total = EXCLUDED.credits_total, \
             plan_id = EXCLUDED.plan_id, \
             cycle_start_at = EXCLUDED.cycle_start_at, \
             cycle_end_at = EXCLUDED.cycle_end_at, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(balance.user_id.as_uuid())
        .bind(balance.credits_remaining)
        .bind(balance.credits_total)
        .bind(balance.plan_id.as_str())
        .bind(balance.cycle_start_at)
        .bind(balance.cycle_end_at)
        .bind(balance.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO credit_transactions (id, user_id, transaction_type, amount, \
             balance_after, description, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(transaction.id.to_string())
        .bind(transaction.user_id.as_uuid())
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.balance_after)
        .bind(&transaction.description)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT * FROM credit_transactions WHERE user_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id.as_uuid())
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CreditTransaction::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use iris_billing_core::{Plan, SubscriptionStatus};

    use super::*;

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect(&url).await.expect("connect");
        store.migrate().await.expect("migrate");
        store
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn account_update_roundtrip() {
        let store = store().await;
        let email = format!("{}@example.com", uuid::Uuid::new_v4());
        let account = Account::new(UserId::generate(), Some(email));
        store.insert_account(&account).await.unwrap();

        let updated = store
            .update_account(
                &account.user_id,
                &AccountUpdate {
                    subscription_status: Some(SubscriptionStatus::Active),
                    subscription_plan: Some(Some("pro_monthly".into())),
                    stripe_customer_id: Some(format!("cus_{}", account.user_id)),
                    plan_id: Some(PlanId::pro()),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.subscription_status, SubscriptionStatus::Active);
        assert_eq!(updated.subscription_plan.as_deref(), Some("pro_monthly"));

        let cleared = store
            .update_account(
                &account.user_id,
                &AccountUpdate {
                    subscription_plan: Some(None),
                    ..AccountUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(cleared.subscription_plan.is_none());
        assert_eq!(cleared.plan_id, PlanId::pro());

        let by_customer = store
            .find_account_by_customer(&format!("cus_{}", account.user_id))
            .await
            .unwrap();
        assert_eq!(by_customer.map(|a| a.user_id), Some(account.user_id));
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn replace_balance_upserts_and_logs() {
        let store = store().await;
        let account = Account::new(UserId::generate(), None);
        store.insert_account(&account).await.unwrap();

        let plan = Plan::new(PlanId::practitioner(), 200, "Practitioner");
        let now = Utc::now();
        for _ in 0..2 {
            let balance =
                CreditBalance::allocation(account.user_id, &plan, now, now + Duration::days(30));
            let tx = CreditTransaction::allocation(&balance, &plan.name);
            store.replace_credit_balance(&balance, &tx).await.unwrap();
        }

        let balance = store
            .get_credit_balance(&account.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.credits_remaining, 200);
        let txs = store.list_transactions(&account.user_id, 10, 0).await.unwrap();
        assert_eq!(txs.len(), 2);
    }
}
