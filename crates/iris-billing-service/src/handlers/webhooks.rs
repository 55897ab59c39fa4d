//! Stripe webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{BillingEvent, WebhookEnvelope};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// Nothing is written unless the payload is authentic. Events that cannot
/// be applied to an account are acknowledged so the provider stops
/// retrying; only unexpected faults answer with a 500.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .ok_or(ApiError::MissingSignature)?
        .to_str()
        .map_err(|_| ApiError::InvalidSignature)?;

    state.verifier.verify(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Stripe webhook signature verification failed");
        ApiError::InvalidSignature
    })?;

    let envelope: WebhookEnvelope = serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed Stripe webhook envelope");
        ApiError::InvalidSignature
    })?;
    let event_id = envelope.id.clone();
    let event_type = envelope.event_type.clone();

    // Authentic but undecodable objects are processing faults.
    let event = BillingEvent::from_envelope(envelope).map_err(|e| {
        tracing::error!(event_id = %event_id, event_type = %event_type, error = %e, "Malformed Stripe event object");
        ApiError::WebhookFailed
    })?;

    tracing::info!(event_id = %event_id, event_type = %event.kind(), "Processing Stripe event");

    match state.reconciler().reconcile(&event).await {
        Ok(outcome) => {
            tracing::debug!(event_id = %event_id, outcome = ?outcome, "Stripe event reconciled");
            Ok(Json(WebhookResponse { received: true }))
        }
        Err(e) => {
            tracing::error!(event_id = %event_id, event_type = %event.kind(), error = %e, "Webhook processing error");
            Err(ApiError::WebhookFailed)
        }
    }
}
