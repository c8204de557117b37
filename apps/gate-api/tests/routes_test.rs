mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use gate_api::db::channels::ChannelRegistry;
use gate_api::db::requests::RequestStore;
use gate_api::error::GateError;
use gate_api::lifecycle::Intent;
use gate_api::models::join_request::{ExpiredRequest, JoinRequest};
use gate_api::templates::DefaultTemplates;
use gate_api::AppState;

use common::{admin_header, ADMIN};

/// Helper: bootstrap `ADMIN` over HTTP and register a channel.
async fn setup_channel(server: &TestServer, channel_id: &str, title: &str) {
    server
        .post("/api/v1/admins/bootstrap")
        .add_header(admin_header(), ADMIN)
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/channels")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "channel_id": channel_id, "title": title }))
        .await;
    resp.assert_status_ok();
}

// ===========================================================================
// GET /health
// ===========================================================================

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["status"], "ok");
}

// ===========================================================================
// /api/v1/admins
// ===========================================================================

#[tokio::test]
async fn bootstrap_only_succeeds_once() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let first = server
        .post("/api/v1/admins/bootstrap")
        .add_header(admin_header(), ADMIN)
        .await;
    first.assert_status_ok();
    assert_eq!(first.json::<Value>()["bootstrapped"], true);

    let second = server
        .post("/api/v1/admins/bootstrap")
        .add_header(admin_header(), "2000")
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["bootstrapped"], false);
}

#[tokio::test]
async fn bootstrap_requires_caller_id() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.post("/api/v1/admins/bootstrap").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn admins_can_add_admins() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .post("/api/v1/admins")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "user_id": "2000" }))
        .await;
    resp.assert_status(StatusCode::CREATED);
    assert!(state.registry.is_admin("2000").await.unwrap());

    let again = server
        .post("/api/v1/admins")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "user_id": "2000" }))
        .await;
    again.assert_status_ok();
    assert_eq!(again.json::<Value>()["added"], false);
}

#[tokio::test]
async fn non_admin_is_forbidden() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .post("/api/v1/admins")
        .add_header(admin_header(), "3000")
        .json(&json!({ "user_id": "3000" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);

    let resp = server
        .put("/api/v1/channels/-1001/welcome")
        .add_header(admin_header(), "3000")
        .json(&json!({ "template": "Hi {name}" }))
        .await;
    resp.assert_status(StatusCode::FORBIDDEN);
}

// ===========================================================================
// /api/v1/channels
// ===========================================================================

#[tokio::test]
async fn reregistration_updates_title_and_keeps_templates() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    server
        .put("/api/v1/channels/-1001/welcome")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "template": "Hello {name}!" }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/channels")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "channel_id": "-1001", "title": "Rust Club" }))
        .await;
    resp.assert_status_ok();

    let channel: Value = resp.json();
    assert_eq!(channel["title"], "Rust Club");
    assert_eq!(channel["welcome_template"], "Hello {name}!");
    assert_eq!(channel["approval_timeout_hours"], 24);
}

#[tokio::test]
async fn register_channel_validates_title() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .post("/api/v1/channels")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "channel_id": "-1002", "title": "   " }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["message"], "Channel title is required");
}

#[tokio::test]
async fn setters_on_unknown_channel_are_not_found() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .put("/api/v1/channels/-404/approval")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "template": "Confirm {channel}" }))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        resp.json::<Value>()["error"]["message"],
        "Channel -404 is not set up"
    );
}

#[tokio::test]
async fn timeout_must_be_positive() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .put("/api/v1/channels/-1001/timeout")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "hours": 0 }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    let resp = server
        .put("/api/v1/channels/-1001/timeout")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "hours": 6 }))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["approval_timeout_hours"], 6);
}

#[tokio::test]
async fn listing_reports_approval_counts() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;
    server
        .post("/api/v1/channels")
        .add_header(admin_header(), ADMIN)
        .json(&json!({ "channel_id": "-1002", "title": "Gophers" }))
        .await
        .assert_status_ok();

    for user in ["7", "8"] {
        server
            .post("/api/v1/events/join-requested")
            .json(&json!({ "channel_id": "-1001", "user_id": user, "user_display_name": "U" }))
            .await
            .assert_status_ok();
        server
            .post("/api/v1/events/approval")
            .json(&json!({ "channel_id": "-1001", "user_id": user }))
            .await
            .assert_status_ok();
    }

    let resp = server
        .get("/api/v1/channels")
        .add_header(admin_header(), ADMIN)
        .await;
    resp.assert_status_ok();
    let list: Vec<Value> = resp.json();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["title"], "Gophers");
    assert_eq!(list[0]["approval_count"], 0);
    assert_eq!(list[1]["title"], "Rustaceans");
    assert_eq!(list[1]["approval_count"], 2);

    let resp = server
        .get("/api/v1/channels/-1001/approvals")
        .add_header(admin_header(), ADMIN)
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<Value>()["approval_count"], 2);
}

#[tokio::test]
async fn decline_route_rejects_pending_request() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    server
        .post("/api/v1/events/join-requested")
        .json(&json!({ "channel_id": "-1001", "user_id": "7" }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/channels/-1001/requests/7/decline")
        .add_header(admin_header(), ADMIN)
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["declined"], true);
    assert_eq!(body["intents"][0]["type"], "decline_member");

    assert!(state.requests.get_pending("-1001", "7").await.unwrap().is_none());

    let again = server
        .post("/api/v1/channels/-1001/requests/7/decline")
        .add_header(admin_header(), ADMIN)
        .await;
    assert_eq!(again.json::<Value>()["declined"], false);
}

#[tokio::test]
async fn decline_route_on_unknown_channel_is_not_found() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;
    let mut intents = state.outbox.subscribe();

    let resp = server
        .post("/api/v1/channels/-404/requests/7/decline")
        .add_header(admin_header(), ADMIN)
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(
        resp.json::<Value>()["error"]["message"],
        "Channel -404 is not set up"
    );
    assert!(intents.try_recv().is_err());
}

// ===========================================================================
// /api/v1/events
// ===========================================================================

#[tokio::test]
async fn join_and_approve_over_http() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    let resp = server
        .post("/api/v1/events/join-requested")
        .json(&json!({
            "channel_id": "-1001",
            "user_id": "7",
            "user_display_name": "Grace",
            "user_handle": "grace"
        }))
        .await;
    resp.assert_status_ok();
    let intents: Vec<Value> = resp.json();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0]["type"], "send_direct_message");
    assert_eq!(intents[0]["action_token"], "approve:-1001:7");

    let resp = server
        .post("/api/v1/events/approval")
        .json(&json!({ "channel_id": "-1001", "user_id": "7", "user_handle": "grace" }))
        .await;
    resp.assert_status_ok();
    let intents: Vec<Value> = resp.json();
    let kinds: Vec<&str> = intents.iter().map(|i| i["type"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        ["admit_member", "send_channel_message", "respond_to_action"]
    );
    assert_eq!(intents[1]["text"], "Welcome @grace to Rustaceans! 🎉");
    assert_eq!(intents[2]["success"], true);
}

#[tokio::test]
async fn approval_accepts_action_token() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    server
        .post("/api/v1/events/join-requested")
        .json(&json!({ "channel_id": "-1001", "user_id": "7" }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/events/approval")
        .json(&json!({ "action_token": "approve:-1001:7" }))
        .await;
    resp.assert_status_ok();
    let intents: Vec<Value> = resp.json();
    assert_eq!(intents[0]["type"], "admit_member");
    assert_eq!(intents[0]["user_id"], "7");
    assert_eq!(intents[2]["token"], "approve:-1001:7");

    let resp = server
        .post("/api/v1/events/approval")
        .json(&json!({ "action_token": "approve-1001-7" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn join_for_unregistered_channel_emits_nothing() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/events/join-requested")
        .json(&json!({ "channel_id": "-404", "user_id": "7" }))
        .await;
    resp.assert_status_ok();
    assert!(resp.json::<Vec<Value>>().is_empty());
}

#[tokio::test]
async fn sweep_endpoint_expires_requests() {
    let (app, _) = common::test_app();
    let server = TestServer::new(app).unwrap();
    setup_channel(&server, "-1001", "Rustaceans").await;

    server
        .post("/api/v1/events/join-requested")
        .json(&json!({
            "channel_id": "-1001",
            "user_id": "7",
            "now": "2025-03-01T12:00:00Z"
        }))
        .await
        .assert_status_ok();

    let resp = server
        .post("/api/v1/events/sweep")
        .json(&json!({ "now": "2025-03-03T12:00:00Z" }))
        .await;
    resp.assert_status_ok();
    let intents: Vec<Value> = resp.json();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0]["recipient_user_id"], "7");
    assert!(intents[0].get("action_token").is_none());
}

// ===========================================================================
// Storage failures
// ===========================================================================

/// A request store whose backend is unreachable.
struct UnreachableStore;

fn unreachable<T>() -> Result<T, GateError> {
    Err(GateError::Storage("connection refused".to_string()))
}

#[async_trait]
impl RequestStore for UnreachableStore {
    async fn create(&self, _: &str, _: &str, _: DateTime<Utc>, _: i32) -> Result<i64, GateError> {
        unreachable()
    }

    async fn approve(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<bool, GateError> {
        unreachable()
    }

    async fn reject(&self, _: &str, _: &str, _: DateTime<Utc>) -> Result<bool, GateError> {
        unreachable()
    }

    async fn reject_request(&self, _: i64, _: DateTime<Utc>) -> Result<bool, GateError> {
        unreachable()
    }

    async fn get_pending(&self, _: &str, _: &str) -> Result<Option<JoinRequest>, GateError> {
        unreachable()
    }

    async fn latest(&self, _: &str, _: &str) -> Result<Option<JoinRequest>, GateError> {
        unreachable()
    }

    async fn list_expired_unresolved(
        &self,
        _: DateTime<Utc>,
    ) -> Result<Vec<ExpiredRequest>, GateError> {
        unreachable()
    }

    async fn count_approved(&self, _: &str) -> Result<i64, GateError> {
        unreachable()
    }
}

#[tokio::test]
async fn events_report_storage_failures() {
    let (_, registry) = common::memory_backends();
    let state = AppState::new(
        Arc::new(UnreachableStore),
        registry,
        DefaultTemplates::default(),
    );
    common::setup_channel(&state, "-1001", "Rustaceans").await;
    let mut published = state.outbox.subscribe();
    let server = TestServer::new(gate_api::routes::router().with_state(state)).unwrap();

    let resp = server
        .post("/api/v1/events/join-requested")
        .json(&json!({ "channel_id": "-1001", "user_id": "7" }))
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"]["message"], "An internal error occurred");

    // Distinct from a request for a channel nobody registered.
    let resp = server
        .post("/api/v1/events/join-requested")
        .json(&json!({ "channel_id": "-404", "user_id": "7" }))
        .await;
    resp.assert_status_ok();
    assert!(resp.json::<Vec<Value>>().is_empty());

    let resp = server
        .post("/api/v1/events/sweep")
        .json(&json!({}))
        .await;
    resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // The approval is still answered so the requester is not left waiting.
    let resp = server
        .post("/api/v1/events/approval")
        .json(&json!({ "channel_id": "-1001", "user_id": "7" }))
        .await;
    resp.assert_status_ok();
    let intents: Vec<Value> = resp.json();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0]["type"], "respond_to_action");
    assert_eq!(intents[0]["success"], false);

    assert!(matches!(
        *published.try_recv().unwrap(),
        Intent::RespondToAction { success: false, .. }
    ));
    assert!(published.try_recv().is_err());
}
