//! Subscription checkout.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use iris_billing_core::PriceKey;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::NewCheckoutSession;

/// Start-checkout request.
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// What to buy (`MONTHLY`, `YEARLY`, `PRACTITIONER_MONTHLY`, `PRACTITIONER_YEARLY`).
    pub price: PriceKey,
}

/// Start-checkout response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Checkout session ID.
    pub session_id: String,
    /// Hosted checkout page to redirect to.
    pub url: Option<String>,
}

/// Start a subscription checkout for the current user.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    let price_id = state
        .prices
        .price_id(body.price)
        .ok_or_else(|| ApiError::Internal(format!("no Stripe price configured for {}", body.price)))?;

    let plan_id = body.price.plan_id();
    let frontend = state.config.frontend_url.trim_end_matches('/');

    let params = NewCheckoutSession {
        price_id: price_id.to_string(),
        customer: account.stripe_customer_id.clone(),
        customer_email: account.email.clone().or(auth.email),
        success_url: format!("{frontend}/success?session_id={{CHECKOUT_SESSION_ID}}"),
        cancel_url: format!("{frontend}/pricing"),
        metadata: vec![
            ("user_id".into(), auth.user_id.to_string()),
            ("plan".into(), body.price.as_str().into()),
            ("plan_id".into(), plan_id.to_string()),
        ],
        subscription_metadata: vec![("plan_id".into(), plan_id.to_string())],
    };

    let session = state
        .billing
        .create_checkout_session(&params)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %auth.user_id, error = %e, "Failed to create checkout session");
            ApiError::ExternalService("Failed to create checkout session".into())
        })?;

    tracing::info!(
        user_id = %auth.user_id,
        session_id = %session.id,
        price = %body.price,
        "Checkout session created"
    );

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}
