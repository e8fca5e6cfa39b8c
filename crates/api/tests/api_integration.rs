//! API integration tests.
//!
//! Drive the full router, auth middleware included, against the in-memory
//! store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use meetpoll_api::{AppState, app};
use meetpoll_core::{
    MemoryPollStore, PollService, ReminderScheduler, SettingsService, TallyService, UserService,
    VoteService,
};
use meetpoll_db::{
    entities::{notification_setting, vote::VoteResponse},
    test_utils::fixtures,
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Seed a store with one poll, two date options and three users.
fn create_test_store() -> Arc<MemoryPollStore> {
    let store = Arc::new(MemoryPollStore::new());
    store.add_user(fixtures::user("creator", "Cat"));
    store.add_user(fixtures::user("u1", "Ann"));
    let mut admin = fixtures::user("admin", "Root");
    admin.is_admin = true;
    store.add_user(admin);

    store.add_poll(fixtures::poll("p1", "creator"));
    store.add_date_option(fixtures::date_option("d1", "p1", "2099-03-01T09:00:00Z"));
    store.add_date_option(fixtures::date_option("d2", "p1", "2099-03-02T09:00:00Z"));
    store
}

fn create_test_router(store: Arc<MemoryPollStore>) -> Router {
    let state = AppState {
        user_service: UserService::new(store.clone()),
        vote_service: VoteService::new(store.clone()),
        tally_service: TallyService::new(store.clone()),
        poll_service: PollService::new(store.clone(), ReminderScheduler::new(store.clone())),
        settings_service: SettingsService::new(store.clone()),
    };
    app(state)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_submit_votes_returns_created() {
    let store = create_test_store();
    let app = create_test_router(store.clone());

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/p1/votes",
            Some("token-u1"),
            Some(json!({
                "votes": [
                    { "dateOptionId": "d1", "response": "yes" },
                    { "dateOptionId": "d2", "response": "maybe" }
                ]
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(store.votes().len(), 2);
}

#[tokio::test]
async fn test_anonymous_vote_on_closed_poll_is_unauthorized() {
    let app = create_test_router(create_test_store());

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/p1/votes",
            None,
            Some(json!({ "votes": [{ "dateOptionId": "d1", "response": "yes" }] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_invalid_date_option_is_bad_request() {
    let store = create_test_store();
    let app = create_test_router(store.clone());

    let response = app
        .oneshot(request(
            "POST",
            "/api/polls/p1/votes",
            Some("token-u1"),
            Some(json!({ "votes": [{ "dateOptionId": "nope", "response": "yes" }] })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.votes().is_empty());
}

#[tokio::test]
async fn test_unknown_poll_returns_404() {
    let app = create_test_router(create_test_store());

    let response = app
        .oneshot(request("GET", "/api/polls/missing/dates", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dates_report_tallies() {
    let store = create_test_store();
    store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
    store.add_vote(fixtures::vote("v2", "p1", "d2", Some("u1"), VoteResponse::No));
    let app = create_test_router(store);

    let response = app
        .oneshot(request("GET", "/api/polls/p1/dates", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["id"], "d1");
    assert_eq!(body["data"][0]["yesCount"], 1);
    assert_eq!(body["data"][0]["totalVotes"], 1);
    assert_eq!(body["data"][1]["noCount"], 1);
}

#[tokio::test]
async fn test_poll_detail_by_access_code() {
    let app = create_test_router(create_test_store());

    let response = app
        .oneshot(request("GET", "/api/polls/code-p1", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["id"], "p1");
    assert_eq!(body["data"]["dates"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_final_date_requires_creator() {
    let store = create_test_store();

    let forbidden = create_test_router(store.clone())
        .oneshot(request(
            "POST",
            "/api/polls/p1/final",
            Some("token-u1"),
            Some(json!({ "dateOptionId": "d1" })),
        ))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let ok = create_test_router(store.clone())
        .oneshot(request(
            "POST",
            "/api/polls/p1/final",
            Some("token-creator"),
            Some(json!({ "dateOptionId": "d1" })),
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(store.poll("p1").unwrap().final_date.as_deref(), Some("d1"));
}

#[tokio::test]
async fn test_delete_vote_returns_no_content() {
    let store = create_test_store();
    store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
    let app = create_test_router(store.clone());

    let response = app
        .oneshot(request("DELETE", "/api/polls/p1/votes/v1", Some("token-u1"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(store.votes().is_empty());
}

#[tokio::test]
async fn test_update_vote_changes_response() {
    let store = create_test_store();
    store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));
    let app = create_test_router(store.clone());

    let response = app
        .oneshot(request(
            "PUT",
            "/api/polls/p1/votes/v1",
            Some("token-u1"),
            Some(json!({ "response": "no" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.votes()[0].response, VoteResponse::No);
}

#[tokio::test]
async fn test_my_votes_requires_login() {
    let store = create_test_store();
    store.add_vote(fixtures::vote("v1", "p1", "d1", Some("u1"), VoteResponse::Yes));

    let anonymous = create_test_router(store.clone())
        .oneshot(request("GET", "/api/user/votes", None, None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let mine = create_test_router(store)
        .oneshot(request("GET", "/api/user/votes", Some("token-u1"), None))
        .await
        .unwrap();
    assert_eq!(mine.status(), StatusCode::OK);
    assert_eq!(json_body(mine).await["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_settings_admin_only() {
    let store = create_test_store();

    let denied = create_test_router(store.clone())
        .oneshot(request("GET", "/api/notifications/settings", Some("token-u1"), None))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let updated = create_test_router(store.clone())
        .oneshot(request(
            "PUT",
            "/api/notifications/settings",
            Some("token-admin"),
            Some(json!({ "key": "reminder_hours", "value": "3" })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let listed = create_test_router(store)
        .oneshot(request("GET", "/api/notifications/settings", Some("token-admin"), None))
        .await
        .unwrap();
    let body = json_body(listed).await;
    let hours = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["key"] == notification_setting::REMINDER_HOURS)
        .cloned()
        .unwrap();
    assert_eq!(hours["value"], "3");
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_test_router(create_test_store());

    let response = app
        .oneshot(request("GET", "/api/nonexistent", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
