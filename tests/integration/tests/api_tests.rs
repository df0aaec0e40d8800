//! End-to-end tests over real sockets
//!
//! Each test starts its own gateway on an ephemeral port with in-memory
//! backends, so no external services are needed.

use integration_tests::*;
use pulse_core::{ChatType, EventKind, OutboundEvent, UserId};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::{self, Message};

// ==================== Health ====================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.unwrap();

    let response = server.get("/health").await.unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());

    let response = server.get("/health/ready").await.unwrap();
    let body: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"], json!({"store": true, "directory": true}));
}

// ==================== Connection ====================

#[tokio::test]
async fn test_upgrade_without_identity_is_refused() {
    let server = TestServer::start().await.unwrap();

    let err = tokio_tungstenite::connect_async(server.socket_url(None))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_presence_follows_connections() {
    let server = TestServer::start().await.unwrap();
    let user = unique_id("u");

    let first = server.connect(&user).await.unwrap();
    let second = server.connect(&user).await.unwrap();
    server.wait_online(&user, true).await.unwrap();

    // Still online while one binding remains
    first.close().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    server.wait_online(&user, true).await.unwrap();

    second.close().await.unwrap();
    server.wait_online(&user, false).await.unwrap();
}

#[tokio::test]
async fn test_reconnect_while_previous_socket_closes_stays_online() {
    let server = TestServer::start().await.unwrap();
    let user = unique_id("u");

    let mut previous = server.connect(&user).await.unwrap();
    server.wait_online(&user, true).await.unwrap();

    for _ in 0..5 {
        let (closed, next) = tokio::join!(previous.close(), server.connect(&user));
        closed.unwrap();
        previous = next.unwrap();
        server.wait_connections(1).await.unwrap();
        server.wait_online(&user, true).await.unwrap();
    }

    previous.close().await.unwrap();
    server.wait_online(&user, false).await.unwrap();
}

#[tokio::test]
async fn test_presence_failure_closes_new_connection() {
    let server = TestServer::start().await.unwrap();
    let user = unique_id("u");
    server.store.fail_key(format!("user:{user}:bindings"));

    let mut client = server.connect(&user).await.unwrap();
    assert_eq!(client.expect_close().await.unwrap(), 4000);
    server.wait_connections(0).await.unwrap();
    assert!(!server
        .state
        .service_context()
        .presence()
        .is_online(&UserId::from(user.as_str()))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_unknown_event_keeps_connection_open() {
    let server = TestServer::start().await.unwrap();
    let user = unique_id("u");
    let mut client = server.connect(&user).await.unwrap();

    client.emit("MESSAGE_CREATE", json!({})).await.unwrap();
    let error = client.expect_event("chatError").await.unwrap();
    assert_eq!(error["error"], "Unknown event");
    assert_eq!(error["event"], "MESSAGE_CREATE");

    // The socket still answers
    client
        .emit("subscribeToUser", json!({"userId": user}))
        .await
        .unwrap();
    let status = client.expect_event("userStatus").await.unwrap();
    assert_eq!(status["userId"], user.as_str());
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect(&unique_id("u")).await.unwrap();

    client
        .send_raw(Message::Text("not json".into()))
        .await
        .unwrap();
    assert_eq!(client.expect_close().await.unwrap(), 4002);
}

#[tokio::test]
async fn test_subscribe_to_user_reports_status() {
    let server = TestServer::start().await.unwrap();
    let (watcher, target) = (unique_id("w"), unique_id("t"));
    let mut client = server.connect(&watcher).await.unwrap();

    client
        .emit("subscribeToUser", json!({"userId": target}))
        .await
        .unwrap();
    let status = status_of(&mut client, &target).await;
    assert_eq!(status["status"], "offline");

    let _target = server.connect(&target).await.unwrap();
    server.wait_online(&target, true).await.unwrap();

    client
        .emit("subscribeToUser", json!({"userId": target}))
        .await
        .unwrap();
    loop {
        let status = status_of(&mut client, &target).await;
        if status["status"] == "online" {
            break;
        }
    }
}

/// Next `userStatus` about `user`; transition broadcasts for others are skipped
async fn status_of(client: &mut TestClient, user: &str) -> Value {
    loop {
        let status = client.expect_event("userStatus").await.unwrap();
        if status["userId"] == user {
            return status;
        }
    }
}

// ==================== Messaging ====================

#[tokio::test]
async fn test_offline_direct_message_is_replayed_on_connect() {
    let server = TestServer::start().await.unwrap();
    let (sender, receiver) = (unique_id("a"), unique_id("b"));
    let chat_id = unique_id("dm");

    let mut a = server.connect(&sender).await.unwrap();
    server.wait_online(&sender, true).await.unwrap();
    a.emit(
        "chatMessage",
        direct_message(&chat_id, &sender, &receiver, "are you there?"),
    )
    .await
    .unwrap();

    // Sender gets its own live copy
    let echo = a.expect_event("newMessage").await.unwrap();
    assert_eq!(echo["content"], "are you there?");
    server.wait_mailbox(&receiver, 1).await.unwrap();

    let mut b = server.connect(&receiver).await.unwrap();
    let replayed = b.expect_event("newMessage").await.unwrap();
    assert_eq!(replayed["content"], "are you there?");
    assert_eq!(replayed["chatId"], chat_id.as_str());

    // Replay empties the mailbox
    server.wait_mailbox(&receiver, 0).await.unwrap();
}

#[tokio::test]
async fn test_large_backlog_replays_in_order_before_live_events() {
    let server = TestServer::start().await.unwrap();
    let (sender, receiver) = (unique_id("a"), unique_id("b"));
    let chat_id = unique_id("dm");

    let mailbox = server.state.service_context().mailbox();
    let queued_for = UserId::from(receiver.as_str());
    for n in 0..200 {
        let event = OutboundEvent::new(EventKind::NewMessage, json!({"chatId": chat_id, "n": n}));
        mailbox.enqueue(&queued_for, &event).await.unwrap();
    }

    let mut a = server.connect(&sender).await.unwrap();
    server.wait_online(&sender, true).await.unwrap();
    let mut b = server.connect(&receiver).await.unwrap();
    server.wait_online(&receiver, true).await.unwrap();

    // Sent while the backlog may still be replaying
    a.emit(
        "chatMessage",
        direct_message(&chat_id, &sender, &receiver, "live one"),
    )
    .await
    .unwrap();

    for n in 0..200 {
        let replayed = b.expect_event("newMessage").await.unwrap();
        assert_eq!(replayed["n"], n, "backlog out of order");
    }
    let live = b.expect_event("newMessage").await.unwrap();
    assert_eq!(live["content"], "live one");

    server.wait_mailbox(&receiver, 0).await.unwrap();
}

#[tokio::test]
async fn test_group_message_reaches_online_and_offline_members() {
    let server = TestServer::start().await.unwrap();
    let (a, b, c) = (unique_id("a"), unique_id("b"), unique_id("c"));
    let group = unique_id("g");
    server
        .directory
        .add_chat(group.as_str(), ChatType::Group, [a.as_str(), b.as_str(), c.as_str()]);

    let mut client_a = server.connect(&a).await.unwrap();
    let mut client_b = server.connect(&b).await.unwrap();
    server.wait_online(&a, true).await.unwrap();
    server.wait_online(&b, true).await.unwrap();

    client_a
        .emit("chatMessage", group_message(&group, &a, "hello group"))
        .await
        .unwrap();

    let live = client_b.expect_event("newMessage").await.unwrap();
    assert_eq!(live["content"], "hello group");
    let echo = client_a.expect_event("newMessage").await.unwrap();
    assert_eq!(echo["content"], "hello group");

    server.wait_mailbox(&c, 1).await.unwrap();
    let mut client_c = server.connect(&c).await.unwrap();
    let replayed = client_c.expect_event("newMessage").await.unwrap();
    assert_eq!(replayed["content"], "hello group");
}

#[tokio::test]
async fn test_spoofed_sender_is_rejected() {
    let server = TestServer::start().await.unwrap();
    let (a, b) = (unique_id("a"), unique_id("b"));
    let mut client = server.connect(&a).await.unwrap();

    client
        .emit("chatMessage", direct_message("dm", &b, &a, "not me"))
        .await
        .unwrap();
    let error = client.expect_event("chatError").await.unwrap();
    assert!(error["error"].is_string());
    assert_eq!(server.state.service_context().mailbox().count(&b.as_str().into()).await.unwrap(), 0);
}

// ==================== Calls ====================

#[tokio::test]
async fn test_direct_call_lifecycle_over_socket_and_http() {
    let server = TestServer::start().await.unwrap();
    let (caller, callee) = (unique_id("a"), unique_id("b"));
    let mut a = server.connect(&caller).await.unwrap();
    let mut b = server.connect(&callee).await.unwrap();
    server.wait_online(&caller, true).await.unwrap();
    server.wait_online(&callee, true).await.unwrap();

    a.emit("call:invite", direct_call("room-1", &callee))
        .await
        .unwrap();
    let invite = b.expect_event("call:invite").await.unwrap();
    let call_id = invite["callId"].as_str().unwrap().to_string();
    let initiated = a.expect_event("call:initiated").await.unwrap();
    assert_eq!(initiated["callId"], call_id.as_str());

    let response = server.get(&format!("/calls/{call_id}")).await.unwrap();
    let session: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session["status"], "ringing");

    b.emit("call:answer", json!({"callId": call_id, "accepted": true}))
        .await
        .unwrap();
    a.expect_event("call:connected").await.unwrap();

    let response = server.get(&format!("/calls/{call_id}")).await.unwrap();
    let session: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session["status"], "connected");
    assert_eq!(session["participants"], json!([caller, callee]));

    let response = server
        .get(&format!("/calls/user/{callee}/active"))
        .await
        .unwrap();
    let active: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(active["activeCalls"].as_array().unwrap().len(), 1);

    let response = server.get("/calls/stats/overview").await.unwrap();
    let stats: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(stats["totalActive"], 1);
    assert_eq!(stats["connected"], 1);

    a.emit("call:end", json!({"callId": call_id})).await.unwrap();
    b.expect_event("call:ended").await.unwrap();

    let response = server.get(&format!("/calls/{call_id}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Call not found");

    let response = server.get("/calls/admin/active").await.unwrap();
    let all: Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(all["count"], 0);
}

#[tokio::test]
async fn test_answer_unknown_call_reports_error() {
    let server = TestServer::start().await.unwrap();
    let mut client = server.connect(&unique_id("u")).await.unwrap();

    client
        .emit("call:answer", json!({"callId": "call_missing", "accepted": true}))
        .await
        .unwrap();
    let error = client.expect_event("chatError").await.unwrap();
    assert_eq!(error, json!({"error": "Call not found", "callId": "call_missing"}));
}
