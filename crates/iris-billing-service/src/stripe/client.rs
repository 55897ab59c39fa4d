//! Stripe API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use super::types::{CheckoutSession, NewCheckoutSession, StripeErrorResponse, Subscription};
use crate::provider::BillingProvider;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// HTTP status of the response.
        status: u16,
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource id that cannot address a single object.
    #[error("invalid Stripe resource id: {0:?}")]
    InvalidResourceId(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl StripeClient {
    /// Stripe API base URL.
    pub const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a client for the public Stripe API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StripeError> {
        Self::with_base_url(api_key, Self::BASE_URL)
    }

    /// Create a client against another base URL (a mock server, a proxy).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, the base URL does not parse, or
    /// the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, StripeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(StripeError::Configuration("Stripe secret key is empty".into()));
        }

        let base_url: String = base_url.into();
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| StripeError::Configuration(format!("invalid Stripe API base: {base_url}")))?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    /// Build an endpoint URL under the API base.
    ///
    /// Each segment is percent-encoded, so a caller-supplied id always stays
    /// inside its own path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StripeError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StripeError::Configuration("Stripe API base cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Endpoint for one object, rejecting ids that would address something else.
    fn object_endpoint(&self, collection: &[&str], id: &str) -> Result<Url, StripeError> {
        if id.is_empty() || id.trim() != id || id == "." || id == ".." {
            return Err(StripeError::InvalidResourceId(id.to_string()));
        }
        let mut segments = collection.to_vec();
        segments.push(id);
        self.endpoint(&segments)
    }

    /// Retrieve a subscription by ID.
    pub async fn get_subscription(&self, subscription_id: &str) -> Result<Subscription, StripeError> {
        let response = self
            .client
            .get(self.object_endpoint(&["subscriptions"], subscription_id)?)
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Retrieve a Checkout session by ID, with its subscription expanded.
    pub async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .get(self.object_endpoint(&["checkout", "sessions"], session_id)?)
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[("expand[]", "subscription")])
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Create a subscription Checkout session.
    pub async fn create_session(
        &self,
        params: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        tracing::debug!(price_id = %params.price_id, "Creating Stripe checkout session");

        let response = self
            .client
            .post(self.endpoint(&["checkout", "sessions"])?)
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params.form_params())
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                status: status.as_u16(),
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                status: status.as_u16(),
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription, StripeError> {
        self.get_subscription(subscription_id).await
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        self.get_checkout_session(session_id).await
    }

    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        self.create_session(params).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let err = StripeClient::new("  ").unwrap_err();
        assert!(matches!(err, StripeError::Configuration(_)));
    }

    #[tokio::test]
    async fn retrieves_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub_1"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_1",
                "object": "subscription",
                "customer": "cus_1",
                "status": "active",
                "current_period_end": 1_767_225_600,
                "metadata": { "plan_id": "pro" },
                "items": { "object": "list", "data": [
                    { "id": "si_1", "price": { "id": "price_m", "recurring": { "interval": "month" } } }
                ] }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();
        let sub = client.get_subscription("sub_1").await.unwrap();

        assert_eq!(sub.customer.as_deref(), Some("cus_1"));
        assert_eq!(sub.current_period_end, Some(1_767_225_600));
        assert_eq!(sub.first_price().map(|p| p.id.as_str()), Some("price_m"));
    }

    #[tokio::test]
    async fn checkout_session_is_fetched_with_subscription_expanded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/checkout/sessions/cs_1"))
            .and(query_param("expand[]", "subscription"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_1",
                "payment_status": "paid",
                "subscription": { "id": "sub_1", "status": "active" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();
        let session = client.get_checkout_session("cs_1").await.unwrap();
        assert!(session.is_paid());
        assert!(session.subscription.unwrap().as_object().is_some());
    }

    #[tokio::test]
    async fn creates_checkout_session_with_form_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/sessions"))
            .and(body_string_contains("mode=subscription"))
            .and(body_string_contains("line_items%5B0%5D%5Bprice%5D=price_y"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_new",
                "url": "https://checkout.stripe.com/c/pay/cs_new"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();
        let session = client
            .create_session(&NewCheckoutSession {
                price_id: "price_y".into(),
                customer: None,
                customer_email: Some("a@example.com".into()),
                success_url: "http://localhost:3000/success".into(),
                cancel_url: "http://localhost:3000/pricing".into(),
                metadata: vec![],
                subscription_metadata: vec![],
            })
            .await
            .unwrap();

        assert_eq!(session.id, "cs_new");
        assert!(session.url.is_some());
    }

    #[tokio::test]
    async fn api_errors_carry_stripe_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "message": "No such subscription: 'sub_missing'",
                    "code": "resource_missing"
                }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();
        let err = client.get_subscription("sub_missing").await.unwrap_err();

        match err {
            StripeError::Api { status, error_type, code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(error_type, "invalid_request_error");
                assert_eq!(code.as_deref(), Some("resource_missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_id_cannot_escape_its_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub_secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_secret",
                "status": "active"
            })))
            .expect(0)
            .mount(&server)
            .await;

        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();
        let result = client
            .get_checkout_session("../../subscriptions/sub_secret")
            .await;
        assert!(result.is_err());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url.path(),
            "/checkout/sessions/..%2F..%2Fsubscriptions%2Fsub_secret"
        );
    }

    #[tokio::test]
    async fn ids_that_address_a_collection_are_rejected() {
        let server = MockServer::start().await;
        let client = StripeClient::with_base_url("sk_test_123", server.uri()).unwrap();

        for id in ["", "..", ".", " cs_1"] {
            let err = client.get_checkout_session(id).await.unwrap_err();
            assert!(matches!(err, StripeError::InvalidResourceId(_)), "{id:?}");
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let client = StripeClient::new("sk_test_123").unwrap();
        let url = client.object_endpoint(&["subscriptions"], "sub_1").unwrap();
        assert_eq!(url.as_str(), "https://api.stripe.com/v1/subscriptions/sub_1");
    }
}
