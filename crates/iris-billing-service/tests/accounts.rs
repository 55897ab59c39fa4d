//! Account and credit endpoint tests.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::{bearer, TestHarness, SERVICE_API_KEY};
use iris_billing_core::{PlanCatalog, PlanId, UserId};
use iris_billing_service::CreditLedger;

#[tokio::test]
async fn service_creates_account() {
    let harness = TestHarness::new();
    let user_id = UserId::generate();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .add_header("x-service-name", "signup-hook".to_string())
        .json(&json!({ "user_id": user_id.to_string(), "email": "new@example.com" }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["plan_id"], "free");
    assert_eq!(body["subscription_status"], "inactive");
    assert_eq!(body["has_paid_access"], false);

    let stored = harness.account(&user_id).await;
    assert_eq!(stored.email.as_deref(), Some("new@example.com"));
}

#[tokio::test]
async fn duplicate_account_conflicts() {
    let harness = TestHarness::new();
    let account = harness.create_account("dup@example.com", None).await;

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", SERVICE_API_KEY.to_string())
        .json(&json!({ "user_id": account.user_id.to_string(), "email": "dup@example.com" }))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_api_key_is_unauthorized() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/accounts")
        .add_header("x-api-key", "nope".to_string())
        .json(&json!({ "user_id": UserId::generate().to_string() }))
        .await;

    response.assert_status_unauthorized();
    assert_eq!(harness.store.writes(), 0);
}

#[tokio::test]
async fn me_returns_account_and_balance() {
    let harness = TestHarness::new();
    let account = harness.create_account("me@example.com", None).await;

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", bearer(&account.user_id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["email"], "me@example.com");
    assert!(body["credits"].is_null());

    let catalog = PlanCatalog::default();
    CreditLedger::new(harness.store.as_ref(), &catalog)
        .allocate(account.user_id, &PlanId::pro(), Utc::now() + Duration::days(30))
        .await
        .unwrap();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", bearer(&account.user_id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["plan_id"], "pro");
    assert_eq!(body["credits"]["credits_remaining"], 30);
    assert_eq!(body["credits"]["credits_total"], 30);
}

#[tokio::test]
async fn me_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/accounts/me")
        .add_header("authorization", bearer(&UserId::generate()))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn transactions_are_paginated_newest_first() {
    let harness = TestHarness::new();
    let account = harness.create_account("tx@example.com", None).await;
    let catalog = PlanCatalog::default();
    let ledger = CreditLedger::new(harness.store.as_ref(), &catalog);

    ledger
        .allocate(account.user_id, &PlanId::pro(), Utc::now() + Duration::days(30))
        .await
        .unwrap();
    ledger
        .allocate(account.user_id, &PlanId::practitioner(), Utc::now() + Duration::days(30))
        .await
        .unwrap();
    ledger.reset_to_free(account.user_id).await.unwrap();

    let response = harness
        .server
        .get("/v1/credits/transactions?limit=2")
        .add_header("authorization", bearer(&account.user_id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(transactions[0]["transaction_type"], "allocation");
    assert_eq!(
        transactions[0]["description"],
        "Reset to free tier after subscription cancellation"
    );
    assert_eq!(transactions[0]["amount"], 1);
    assert_eq!(transactions[1]["amount"], 200);

    let response = harness
        .server
        .get("/v1/credits/transactions?limit=2&offset=2")
        .add_header("authorization", bearer(&account.user_id))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(body["transactions"][0]["amount"], 30);
    assert_eq!(body["has_more"], false);
}
