//! HTTP API tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use site_ledger::api::{router, AppState};
use site_ledger::ledger::{ChainVerifier, VerifyMode, OPERATION_CREATE, OPERATION_UPDATE};

mod common;
use common::*;

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (ledger, _db) = setup_test_ledger().await;
    let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);
    let app = router(AppState { ledger, verifier });

    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_entries_and_verify_endpoints() {
    let (ledger, db) = setup_test_ledger().await;
    let actor = test_actor();
    ledger
        .record(Some("acme"), &actor, "Order", OPERATION_CREATE, json!({"id": 1}), None)
        .await
        .unwrap();
    let second = ledger
        .record(Some("acme"), &actor, "Order", OPERATION_UPDATE, json!({"id": 1, "paid": true}), None)
        .await
        .unwrap();

    let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);
    let app = router(AppState { ledger, verifier });

    let (status, body) = get_json(app.clone(), "/tenants/acme/entries").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["previous_hash"], entries[0]["current_hash"]);

    let (status, body) = get_json(app.clone(), "/tenants/acme/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);
    assert_eq!(body["entries_checked"], 2);

    overwrite_payload(&db, second.id, &json!({"id": 1, "paid": false})).await;

    let (status, body) = get_json(app, "/tenants/acme/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], false);
    assert_eq!(body["first_corrupt_entry"]["id"], second.id);
}

#[tokio::test]
async fn test_unknown_tenant_is_empty_and_valid() {
    let (ledger, _db) = setup_test_ledger().await;
    let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);
    let app = router(AppState { ledger, verifier });

    let (status, body) = get_json(app.clone(), "/tenants/nobody/entries").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_, body) = get_json(app, "/tenants/nobody/verify").await;
    assert_eq!(body["is_valid"], true);
}

#[tokio::test]
async fn test_storage_failure_is_service_unavailable() {
    let (ledger, db) = setup_test_ledger().await;
    let verifier = ChainVerifier::for_ledger(&ledger, VerifyMode::Linked);
    let app = router(AppState { ledger, verifier });
    db.close().await;

    let (status, body) = get_json(app, "/tenants/acme/verify").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}
