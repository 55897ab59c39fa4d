//! Account handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use iris_billing_core::{Account, CreditBalance, CreditTransaction, UserId};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Email address.
    pub email: Option<String>,
    /// Current plan.
    pub plan_id: String,
    /// Subscription status.
    pub subscription_status: String,
    /// Plan label, e.g. `pro_monthly`.
    pub subscription_plan: Option<String>,
    /// End of the paid period (RFC 3339).
    pub subscription_expires_at: Option<String>,
    /// Whether paid features are unlocked.
    pub has_paid_access: bool,
    /// Current credit balance, if one was ever allocated.
    pub credits: Option<BalanceResponse>,
    /// Created timestamp.
    pub created_at: String,
}

impl AccountResponse {
    fn new(account: &Account, balance: Option<&CreditBalance>) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            email: account.email.clone(),
            plan_id: account.plan_id.to_string(),
            subscription_status: account.subscription_status.to_string(),
            subscription_plan: account.subscription_plan.clone(),
            subscription_expires_at: account.subscription_expires_at.map(|t| t.to_rfc3339()),
            has_paid_access: account.has_paid_access(),
            credits: balance.map(BalanceResponse::from),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Credit balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Credits left this cycle.
    pub credits_remaining: i64,
    /// Allotment of this cycle.
    pub credits_total: i64,
    /// Plan that produced the allotment.
    pub plan_id: String,
    /// Cycle start (RFC 3339).
    pub cycle_start_at: String,
    /// Cycle end (RFC 3339).
    pub cycle_end_at: String,
}

impl From<&CreditBalance> for BalanceResponse {
    fn from(balance: &CreditBalance) -> Self {
        Self {
            credits_remaining: balance.credits_remaining,
            credits_total: balance.credits_total,
            plan_id: balance.plan_id.to_string(),
            cycle_start_at: balance.cycle_start_at.to_rfc3339(),
            cycle_end_at: balance.cycle_end_at.to_rfc3339(),
        }
    }
}

/// Create account request, sent by the signup hook.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Identity provider user ID.
    pub user_id: UserId,
    /// Email captured at signup.
    pub email: Option<String>,
}

/// Register a freshly signed-up user.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let email = body
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty());
    let account = Account::new(body.user_id, email);

    state.store.insert_account(&account).await?;

    tracing::info!(user_id = %account.user_id, service = %service.service_name, "Account created");

    Ok((StatusCode::CREATED, Json(AccountResponse::new(&account, None))))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;
    let balance = state.store.get_credit_balance(&auth.user_id).await?;

    Ok(Json(AccountResponse::new(&account, balance.as_ref())))
}

/// Query parameters for listing transactions.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Number of transactions to skip.
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction type.
    pub transaction_type: String,
    /// Credits added.
    pub amount: i64,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&CreditTransaction> for TransactionResponse {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            transaction_type: tx.transaction_type.as_str().to_string(),
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions, newest first.
    pub transactions: Vec<TransactionResponse>,
    /// Whether more transactions exist past this page.
    pub has_more: bool,
}

/// List the current user's credit transactions.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Verify account exists
    state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .store
        .list_transactions(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = transactions.len() > limit;
    let transactions = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}
