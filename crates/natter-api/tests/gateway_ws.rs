//! Gateway behavior over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use natter_api::auth::create_token;
use natter_api::{AppState, AppStateInner, Conversations, router};
use natter_db::Database;
use natter_gateway::Dispatcher;
use natter_types::events::GatewayEvent;
use natter_types::models::MessageContent;

const SECRET: &str = "test-secret";

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, AppState) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::default();
    let conversations = Conversations::new(db.clone(), dispatcher.clone());
    let state = AppStateInner::new(db, SECRET.to_string(), dispatcher, conversations, None);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

fn create_user(state: &AppState, username: &str) -> (Uuid, String) {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(id, username, username, "not-a-real-hash", None)
        .unwrap();
    (id, create_token(SECRET, id, username).unwrap())
}

async fn connect(addr: SocketAddr, token: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}/gateway?token={}", addr, token))
        .await
        .unwrap();
    ws
}

async fn next_event(ws: &mut Ws) -> GatewayEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for gateway event")
            .expect("gateway closed")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skips presence updates, which arrive whenever anyone connects or leaves.
async fn next_message_event(ws: &mut Ws) -> GatewayEvent {
    loop {
        match next_event(ws).await {
            GatewayEvent::Presence { .. } => continue,
            event => return event,
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn connect_sends_ready_then_presence() {
    let (addr, state) = start_server().await;
    let (bob, token) = create_user(&state, "bob");

    let mut ws = connect(addr, &token).await;

    match next_event(&mut ws).await {
        GatewayEvent::Ready { user_id, username } => {
            assert_eq!(user_id, bob);
            assert_eq!(username, "bob");
        }
        other => panic!("expected ready, got {:?}", other),
    }
    match next_event(&mut ws).await {
        GatewayEvent::Presence { user_ids } => assert!(user_ids.contains(&bob)),
        other => panic!("expected presence, got {:?}", other),
    }
    assert!(state.dispatcher.presence().is_online(bob));
}

#[tokio::test]
async fn bad_token_is_rejected_before_upgrade() {
    let (addr, _state) = start_server().await;
    let result = connect_async(format!("ws://{}/gateway?token=garbage", addr)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn sent_message_is_pushed_to_receiver() {
    let (addr, state) = start_server().await;
    let (alice, _) = create_user(&state, "alice");
    let (bob, bob_token) = create_user(&state, "bob");

    let mut ws = connect(addr, &bob_token).await;
    next_event(&mut ws).await; // ready
    wait_until(|| state.dispatcher.presence().is_online(bob)).await;

    let outcome = state
        .conversations
        .send_message(alice, bob, MessageContent::text("hi"), None)
        .await
        .unwrap();

    match next_message_event(&mut ws).await {
        GatewayEvent::Created(message) => {
            assert_eq!(message.id, outcome.message.id);
            assert_eq!(message.text.as_deref(), Some("hi"));
        }
        other => panic!("expected created, got {:?}", other),
    }

    state
        .conversations
        .delete_message(alice, outcome.message.id)
        .await
        .unwrap();

    match next_message_event(&mut ws).await {
        GatewayEvent::Deleted { message_id } => assert_eq!(message_id, outcome.message.id),
        other => panic!("expected deleted, got {:?}", other),
    }
}

#[tokio::test]
async fn newer_connection_replaces_older_one() {
    let (addr, state) = start_server().await;
    let (alice, _) = create_user(&state, "alice");
    let (bob, bob_token) = create_user(&state, "bob");

    let mut first = connect(addr, &bob_token).await;
    next_event(&mut first).await; // ready
    wait_until(|| state.dispatcher.presence().is_online(bob)).await;
    let first_conn = state.dispatcher.presence().lookup(bob).unwrap().conn_id();

    let mut second = connect(addr, &bob_token).await;
    next_event(&mut second).await; // ready
    wait_until(|| {
        state
            .dispatcher
            .presence()
            .lookup(bob)
            .is_some_and(|h| h.conn_id() != first_conn)
    })
    .await;

    // The superseded socket is closed by the server
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = first.next().await {
            match frame {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    state
        .conversations
        .send_message(alice, bob, MessageContent::text("to the new socket"), None)
        .await
        .unwrap();

    match next_message_event(&mut second).await {
        GatewayEvent::Created(message) => {
            assert_eq!(message.text.as_deref(), Some("to the new socket"))
        }
        other => panic!("expected created, got {:?}", other),
    }
    assert!(state.dispatcher.presence().is_online(bob));
}

#[tokio::test]
async fn closing_the_socket_marks_user_offline() {
    let (addr, state) = start_server().await;
    let (bob, bob_token) = create_user(&state, "bob");

    let mut ws = connect(addr, &bob_token).await;
    next_event(&mut ws).await; // ready
    wait_until(|| state.dispatcher.presence().is_online(bob)).await;

    ws.close(None).await.unwrap();
    drop(ws);

    wait_until(|| !state.dispatcher.presence().is_online(bob)).await;
}
