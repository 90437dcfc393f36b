//! HTTP flows driven through the router without binding a socket.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use natter_api::{AppState, AppStateInner, Conversations, router};
use natter_db::Database;
use natter_gateway::Dispatcher;
use natter_types::models::BOT_USER_ID;

const SECRET: &str = "test-secret";

fn app() -> (Router, AppState) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::default();
    let conversations = Conversations::new(db.clone(), dispatcher.clone());
    let state = AppStateInner::new(db, SECRET.to_string(), dispatcher, conversations, None);
    (router(state.clone()), state)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, username: &str) -> (Uuid, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let user_id = body["user_id"].as_str().unwrap().parse().unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    (user_id, token)
}

#[tokio::test]
async fn register_then_login() {
    let (app, _state) = app();
    let (alice, _) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], alice.to_string());
    assert!(body["token"].as_str().is_some());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_and_invalid_registrations_are_rejected() {
    let (app, _state) = app();
    register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "al", "password": "long enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn username_length_counts_characters() {
    let (app, _state) = app();

    // Three characters, six bytes
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "äöü", "password": "long enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // 32 characters, 64 bytes
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "é".repeat(32), "password": "long enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn assistant_username_is_reserved() {
    let (app, _state) = app();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "username": "Gemini", "password": "long enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The lazily created assistant still shows up for everyone
    let (_alice, token) = register(&app, "alice").await;
    let (status, body) = call(&app, Method::GET, "/api/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], BOT_USER_ID.to_string());
}

#[tokio::test]
async fn bot_account_cannot_log_in() {
    let (app, state) = app();
    state.db.ensure_bot_user().unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "gemini", "password": "!" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let (app, _state) = app();

    let (status, body) = call(&app, Method::GET, "/api/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = call(&app, Method::GET, "/api/users", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn contacts_list_everyone_else_with_bot_first() {
    let (app, _state) = app();
    let (_alice, alice_token) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (status, body) = call(&app, Method::GET, "/api/users", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let contacts = body.as_array().unwrap();
    assert_eq!(contacts.len(), 2);
    assert_eq!(contacts[0]["id"], BOT_USER_ID.to_string());
    assert_eq!(contacts[0]["is_bot"], true);
    assert_eq!(contacts[1]["id"], bob.to_string());
    assert!(contacts[1].get("password").is_none());
}

#[tokio::test]
async fn message_lifecycle_over_http() {
    let (app, _state) = app();
    let (alice, alice_token) = register(&app, "alice").await;
    let (bob, bob_token) = register(&app, "bob").await;

    // Send
    let (status, sent) = call(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", bob),
        Some(&alice_token),
        Some(json!({ "text": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["sender_id"], alice.to_string());
    assert_eq!(sent["receiver_id"], bob.to_string());
    assert_eq!(sent["text"], "hi");
    let message_id = sent["id"].as_str().unwrap().to_string();

    // Reply from the other side
    let (status, reply) = call(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", alice),
        Some(&bob_token),
        Some(json!({ "text": "hey", "reply_to": message_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["reply_to"]["id"], message_id.as_str());

    // Both sides see the same history
    let (_, from_alice) = call(
        &app,
        Method::GET,
        &format!("/api/messages/{}", bob),
        Some(&alice_token),
        None,
    )
    .await;
    let (_, from_bob) = call(
        &app,
        Method::GET,
        &format!("/api/messages/{}", alice),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(from_alice, from_bob);
    assert_eq!(from_alice.as_array().unwrap().len(), 2);

    // Bob may not edit Alice's message
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/messages/edit/{}", message_id),
        Some(&bob_token),
        Some(json!({ "text": "mine now" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Edit
    let (status, edited) = call(
        &app,
        Method::PUT,
        &format!("/api/messages/edit/{}", message_id),
        Some(&alice_token),
        Some(json!({ "text": "hi there" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["text"], "hi there");
    assert_eq!(edited["created_at"], sent["created_at"]);

    // Delete
    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/api/messages/delete/{}", message_id),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message deleted successfully");

    let (_, history) = call(
        &app,
        Method::GET,
        &format!("/api/messages/{}", bob),
        Some(&alice_token),
        None,
    )
    .await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["text"], "hey");
    assert_eq!(history[0]["reply_to"], Value::Null);
}

#[tokio::test]
async fn missing_messages_are_404() {
    let (app, _state) = app();
    let (_alice, token) = register(&app, "alice").await;
    let missing = Uuid::new_v4();

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/messages/edit/{}", missing),
        Some(&token),
        Some(json!({ "text": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Message not found");

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/messages/delete/{}", missing),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let (app, _state) = app();
    let (_alice, token) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", bob),
        Some(&token),
        Some(json!({ "text": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_to_bot_is_acknowledged_immediately() {
    let (app, state) = app();
    let (alice, token) = register(&app, "alice").await;

    let (status, sent) = call(
        &app,
        Method::POST,
        &format!("/api/messages/send/{}", BOT_USER_ID),
        Some(&token),
        Some(json!({ "text": "hello assistant" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["sender_id"], alice.to_string());
    assert_eq!(sent["receiver_id"], BOT_USER_ID.to_string());

    // No assistant is configured, so only the user's message is ever stored
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(state.db.conversation_between(alice, BOT_USER_ID).unwrap().len(), 1);
}

#[tokio::test]
async fn summarize_falls_back_to_extractive_summary() {
    let (app, _state) = app();
    let (_alice, token) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/summarize",
        Some(&token),
        Some(json!({ "text": "First point. Second point. Third point. Fourth point. Final point." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "First point. Third point. Final point.");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/summarize",
        Some(&token),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
