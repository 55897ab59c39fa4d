//! Typed Stripe webhook events.

use serde::Deserialize;

use super::types::{CheckoutSession, Invoice, Subscription};

/// Outer shape shared by every Stripe event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Event ID.
    pub id: String,
    /// Event type (e.g. `checkout.session.completed`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
    /// Event data.
    pub data: EnvelopeData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeData {
    /// The object the event is about.
    pub object: serde_json::Value,
}

/// A billing lifecycle event the reconciler understands.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(CheckoutSession),
    /// `customer.subscription.updated`
    SubscriptionUpdated(Subscription),
    /// `customer.subscription.deleted`
    SubscriptionDeleted(Subscription),
    /// `invoice.payment_failed`
    InvoicePaymentFailed(Invoice),
    /// `invoice.paid`
    InvoicePaid(Invoice),
    /// Any other event type; acknowledged without effect.
    Unrecognized(String),
}

impl BillingEvent {
    /// Decode the event object according to the envelope's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the object of a recognized event type does not
    /// have the expected shape.
    pub fn from_envelope(envelope: WebhookEnvelope) -> Result<Self, serde_json::Error> {
        let object = envelope.data.object;
        Ok(match envelope.event_type.as_str() {
            "checkout.session.completed" => Self::CheckoutCompleted(serde_json::from_value(object)?),
            "customer.subscription.updated" => {
                Self::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                Self::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "invoice.payment_failed" => Self::InvoicePaymentFailed(serde_json::from_value(object)?),
            "invoice.paid" => Self::InvoicePaid(serde_json::from_value(object)?),
            _ => Self::Unrecognized(envelope.event_type),
        })
    }

    /// The provider's name for this event type.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.session.completed",
            Self::SubscriptionUpdated(_) => "customer.subscription.updated",
            Self::SubscriptionDeleted(_) => "customer.subscription.deleted",
            Self::InvoicePaymentFailed(_) => "invoice.payment_failed",
            Self::InvoicePaid(_) => "invoice.paid",
            Self::Unrecognized(kind) => kind,
        }
    }
}
