//! Common test utilities for iris-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::{TestResponse, TestServer};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use iris_billing_core::{Account, AccountUpdate, CreditBalance, CreditTransaction, UserId};
use iris_billing_service::stripe::{
    signature_header, CheckoutSession, NewCheckoutSession, StripeError, Subscription,
};
use iris_billing_service::{create_router, AppState, BillingProvider, ServiceConfig};
use iris_billing_store::{MemoryStore, Store, StoreError};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";

pub const PRO_MONTHLY_PRICE: &str = "price_pro_monthly";
pub const PRO_YEARLY_PRICE: &str = "price_pro_yearly";
pub const PRACTITIONER_MONTHLY_PRICE: &str = "price_practitioner_monthly";
pub const PRACTITIONER_YEARLY_PRICE: &str = "price_practitioner_yearly";

/// 2026-01-01T00:00:00Z
pub const PERIOD_END: i64 = 1_767_225_600;

// ============================================================================
// Fakes
// ============================================================================

/// In-memory stand-in for Stripe.
#[derive(Default)]
pub struct FakeBilling {
    subscriptions: Mutex<HashMap<String, Subscription>>,
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    created: Mutex<Vec<NewCheckoutSession>>,
    failing: AtomicBool,
}

impl FakeBilling {
    pub fn add_subscription(&self, subscription: Value) {
        let sub: Subscription = serde_json::from_value(subscription).expect("valid subscription");
        self.subscriptions.lock().unwrap().insert(sub.id.clone(), sub);
    }

    pub fn add_session(&self, session: Value) {
        let session: CheckoutSession = serde_json::from_value(session).expect("valid session");
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    /// Make every call fail as if Stripe were down.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn created_sessions(&self) -> Vec<NewCheckoutSession> {
        self.created.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StripeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(api_error(500, "api_error"));
        }
        Ok(())
    }
}

fn api_error(status: u16, error_type: &str) -> StripeError {
    StripeError::Api {
        status,
        error_type: error_type.into(),
        message: "fake".into(),
        code: None,
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn retrieve_subscription(&self, id: &str) -> Result<Subscription, StripeError> {
        self.check()?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| api_error(404, "invalid_request_error"))
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, StripeError> {
        self.check()?;
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| api_error(404, "invalid_request_error"))
    }

    async fn create_checkout_session(
        &self,
        params: &NewCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        self.check()?;
        let mut created = self.created.lock().unwrap();
        created.push(params.clone());
        let id = format!("cs_test_{}", created.len());
        Ok(serde_json::from_value(json!({
            "id": id,
            "url": format!("https://checkout.stripe.com/c/pay/{id}"),
        }))
        .expect("valid session"))
    }
}

/// Memory store that counts writes and can be told to fail them.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
    fail_balance_writes: AtomicBool,
}

impl RecordingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Fail only credit balance writes; account writes still succeed.
    pub fn fail_balance_writes(&self) {
        self.fail_balance_writes.store(true, Ordering::SeqCst);
    }

    fn write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.write()?;
        self.inner.insert_account(account).await
    }

    async fn get_account(&self, user_id: &UserId) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(user_id).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_email(email).await
    }

    async fn find_account_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_customer(customer_id).await
    }

    async fn update_account(
        &self,
        user_id: &UserId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        self.write()?;
        self.inner.update_account(user_id, update).await
    }

    async fn get_credit_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>, StoreError> {
        self.inner.get_credit_balance(user_id).await
    }

    async fn replace_credit_balance(
        &self,
        balance: &CreditBalance,
        transaction: &CreditTransaction,
    ) -> Result<(), StoreError> {
        if self.fail_balance_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected balance failure".into()));
        }
        self.write()?;
        self.inner.replace_credit_balance(balance, transaction).await
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        self.inner.list_transactions(user_id, limit, offset).await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Service configuration used by the harness.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        stripe_secret_key: Some("sk_test_fake".into()),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        monthly_price_id: Some(PRO_MONTHLY_PRICE.into()),
        yearly_price_id: Some(PRO_YEARLY_PRICE.into()),
        practitioner_monthly_price_id: Some(PRACTITIONER_MONTHLY_PRICE.into()),
        practitioner_yearly_price_id: Some(PRACTITIONER_YEARLY_PRICE.into()),
        auth_jwt_secret: Some(JWT_SECRET.into()),
        service_api_key: Some(SERVICE_API_KEY.into()),
        frontend_url: "http://localhost:3000".into(),
        ..ServiceConfig::default()
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server.
    pub store: Arc<RecordingStore>,
    /// The fake billing provider behind the server.
    pub billing: Arc<FakeBilling>,
}

impl TestHarness {
    /// Create a new test harness with an empty store.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(RecordingStore::default());
        let billing = Arc::new(FakeBilling::default());

        let state = AppState::new(config, store.clone(), billing.clone());
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            billing,
        }
    }

    /// Register an account directly in the store.
    pub async fn create_account(&self, email: &str, customer: Option<&str>) -> Account {
        let mut account = Account::new(UserId::generate(), Some(email.to_string()));
        account.stripe_customer_id = customer.map(String::from);
        self.store.insert_account(&account).await.expect("insert account");
        account
    }

    pub async fn account(&self, user_id: &UserId) -> Account {
        self.store
            .get_account(user_id)
            .await
            .unwrap()
            .expect("account exists")
    }

    pub async fn balance(&self, user_id: &UserId) -> Option<CreditBalance> {
        self.store.get_credit_balance(user_id).await.unwrap()
    }

    /// Post a correctly signed webhook.
    pub async fn post_webhook(&self, payload: &Value) -> TestResponse {
        let body = payload.to_string();
        let signature = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &body);
        self.post_raw_webhook(body, Some(signature)).await
    }

    /// Post a webhook body with an arbitrary signature header.
    pub async fn post_raw_webhook(&self, body: String, signature: Option<String>) -> TestResponse {
        let mut request = self.server.post("/webhooks/stripe");
        if let Some(signature) = signature {
            request = request.add_header("stripe-signature", signature);
        }
        request.text(body).await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Payload builders
// ============================================================================

/// Bearer header with a freshly minted token for `user_id`.
pub fn bearer(user_id: &UserId) -> String {
    bearer_with(JWT_SECRET, "authenticated", &user_id.to_string())
}

pub fn bearer_with(secret: &str, audience: &str, subject: &str) -> String {
    let claims = json!({
        "sub": subject,
        "aud": audience,
        "exp": Utc::now().timestamp() + 3600,
        "email": "user@example.com",
        "role": "authenticated",
    });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("encode token");
    format!("Bearer {token}")
}

/// A Stripe event envelope.
pub fn event(event_type: &str, object: Value) -> Value {
    json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "object": "event",
        "type": event_type,
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": object }
    })
}

/// A subscription object.
pub fn subscription(
    id: &str,
    customer: &str,
    status: &str,
    metadata_plan: Option<&str>,
    price_id: &str,
) -> Value {
    let metadata = metadata_plan.map_or_else(|| json!({}), |p| json!({ "plan_id": p }));
    let interval = if price_id.contains("yearly") { "year" } else { "month" };
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": status,
        "current_period_end": PERIOD_END,
        "metadata": metadata,
        "items": {
            "object": "list",
            "data": [{ "id": "si_1", "price": { "id": price_id, "recurring": { "interval": interval } } }],
            "has_more": false
        }
    })
}
