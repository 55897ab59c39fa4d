//! Checkout session verification, for the post-checkout confirmation screen.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use iris_billing_core::{BillingInterval, PlanId};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters.
#[derive(Debug, Deserialize)]
pub struct VerifySessionQuery {
    /// Checkout session to verify.
    pub session_id: Option<String>,
}

/// What the customer bought.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionVerification {
    /// Always `true`.
    pub success: bool,
    /// Plan id from the session metadata.
    pub plan_id: String,
    /// Display name of the plan.
    pub plan_name: String,
    /// `monthly` or `yearly`.
    pub billing_interval: BillingInterval,
    /// Credits granted per cycle.
    pub credits: i64,
    /// Email the customer entered at checkout.
    pub customer_email: Option<String>,
}

/// Verify that a checkout session was paid and describe its plan.
///
/// Reads provider state only.
pub async fn verify_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifySessionQuery>,
) -> Result<Json<SessionVerification>, ApiError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing session_id".into()))?;

    let session = state
        .billing
        .retrieve_checkout_session(&session_id)
        .await
        .map_err(|e| {
            tracing::error!(session_id = %session_id, error = %e, "Error verifying session");
            ApiError::VerificationFailed
        })?;

    if !session.is_paid() {
        return Err(ApiError::PaymentIncomplete);
    }

    let plan_id = session.metadata_value("plan_id").unwrap_or(PlanId::PRO);
    let plan = PlanId::new(plan_id)
        .ok()
        .and_then(|id| state.catalog.get_or_pro(&id).ok())
        .ok_or_else(|| ApiError::Internal("plan catalog has no pro plan".into()))?;

    let interval = BillingInterval::from_recurring(
        session
            .subscription
            .as_ref()
            .and_then(|sub| sub.as_object())
            .and_then(|sub| sub.first_price())
            .and_then(|price| price.recurring.as_ref())
            .map(|recurring| recurring.interval.as_str()),
    );

    Ok(Json(SessionVerification {
        success: true,
        plan_id: plan_id.to_string(),
        plan_name: plan.name.clone(),
        billing_interval: interval,
        credits: plan.monthly_credits,
        customer_email: session.customer_details.as_ref().and_then(|d| d.email.clone()),
    }))
}
