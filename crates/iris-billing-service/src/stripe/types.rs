//! Stripe API types.
//!
//! Only the fields the service reads are modelled; everything else in the
//! provider's payloads is ignored on deserialization.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A field Stripe returns either as an object id or, when expanded, as the
/// object itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    /// Bare object id.
    Id(String),
    /// Expanded object.
    Object(Box<T>),
}

impl<T> Expandable<T> {
    /// The expanded object, if present.
    #[must_use]
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Id(_) => None,
            Self::Object(obj) => Some(obj),
        }
    }
}

impl Expandable<Subscription> {
    /// The subscription id, whether expanded or not.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object(sub) => &sub.id,
        }
    }
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout mode (`payment`, `subscription`, `setup`).
    #[serde(default)]
    pub mode: Option<String>,
    /// Payment status (`paid`, `unpaid`, `no_payment_required`).
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Email passed when the session was created.
    #[serde(default)]
    pub customer_email: Option<String>,
    /// Details the customer entered during checkout.
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    /// Subscription created by the session.
    #[serde(default)]
    pub subscription: Option<Expandable<Subscription>>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
}

impl CheckoutSession {
    /// Whether the session has been paid for.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Whether the session started a subscription.
    #[must_use]
    pub fn is_subscription(&self) -> bool {
        self.mode.as_deref() == Some("subscription")
    }

    /// Best email for the paying customer.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.customer_details.as_ref()?.email.as_deref())
    }

    /// A metadata value, with blanks treated as absent.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        non_blank(self.metadata.get(key))
    }
}

/// Customer details collected during checkout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Stripe subscription object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Provider status (`active`, `past_due`, `canceled`, ...).
    #[serde(default)]
    pub status: String,
    /// End of the current period (Unix seconds).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Subscription items.
    #[serde(default)]
    pub items: StripeList<SubscriptionItem>,
}

impl Subscription {
    /// End of the current period as an instant.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    /// The price of the first item.
    #[must_use]
    pub fn first_price(&self) -> Option<&Price> {
        self.items.data.first().map(|item| &item.price)
    }

    /// A metadata value, with blanks treated as absent.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        non_blank(self.metadata.get(key))
    }
}

/// One line of a subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    /// Item ID.
    #[serde(default)]
    pub id: Option<String>,
    /// The price being billed.
    pub price: Price,
}

/// Stripe price object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Price {
    /// Price ID.
    pub id: String,
    /// Recurrence, for subscription prices.
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

/// Recurrence of a price.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recurring {
    /// `day`, `week`, `month` or `year`.
    pub interval: String,
}

/// Stripe invoice object.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    /// Invoice ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription the invoice bills, if any.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            has_more: false,
        }
    }
}

/// Parameters for a subscription checkout.
#[derive(Debug, Clone, Serialize)]
pub struct NewCheckoutSession {
    /// Provider price id of the single line item.
    pub price_id: String,
    /// Existing customer to attach the session to.
    pub customer: Option<String>,
    /// Email to prefill when no customer exists yet.
    pub customer_email: Option<String>,
    /// Redirect after payment.
    pub success_url: String,
    /// Redirect on cancel.
    pub cancel_url: String,
    /// Session metadata.
    pub metadata: Vec<(String, String)>,
    /// Metadata copied onto the created subscription.
    pub subscription_metadata: Vec<(String, String)>,
}

impl NewCheckoutSession {
    /// Form-encoded parameters in Stripe's bracket notation.
    #[must_use]
    pub fn form_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];

        if let Some(customer) = &self.customer {
            params.push(("customer".to_string(), customer.clone()));
        } else if let Some(email) = &self.customer_email {
            params.push(("customer_email".to_string(), email.clone()));
        }

        for (key, value) in &self.metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }
        for (key, value) in &self.subscription_metadata {
            params.push((format!("subscription_data[metadata][{key}]"), value.clone()));
        }

        params
    }
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}
