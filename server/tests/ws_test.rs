//! Integration tests for WebSocket sessions: live delivery, push suppression,
//! supersession and call/game handshakes.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

use common::{assert_no_event, client_event, next_event, start_test_server};

#[tokio::test]
async fn test_invalid_token_closes_with_4002() {
    let server = start_test_server().await;
    let url = format!("ws://{}/ws?token=not-a-jwt", server.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4002),
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_online_receiver_gets_live_message_and_push() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;
    server.add_push_token(&bob, "ExponentPushToken[bob]").await;
    let mut bob_ws = server.connect_ws(&bob).await;

    let body: Value = server
        .send_text(&alice, &bob.id, "you there?")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["delivered_live"], true);

    let event = next_event(&mut bob_ws).await;
    assert_eq!(event["event"], "receiveMessage");
    assert_eq!(event["data"]["id"], body["message"]["id"]);
    assert_eq!(event["data"]["sender_id"], alice.id.as_str());
    assert_eq!(event["data"]["message"], "you there?");
    assert_eq!(event["data"]["read"], false);

    // Online but not looking at this conversation: push still goes out
    server.wait_for_push(1).await;
}

#[tokio::test]
async fn test_viewing_the_conversation_suppresses_push() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;
    server.add_push_token(&bob, "ExponentPushToken[bob]").await;
    let mut bob_ws = server.connect_ws(&bob).await;

    bob_ws
        .send(client_event("enterConversation", json!({ "partner_id": alice.id })))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resp = server.send_text(&alice, &bob.id, "first").await;
    assert_eq!(resp.status(), 201);
    assert_eq!(next_event(&mut bob_ws).await["event"], "receiveMessage");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.gateway.sent().is_empty());

    bob_ws
        .send(client_event("leaveConversation", json!({})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.send_text(&alice, &bob.id, "second").await;
    assert_eq!(next_event(&mut bob_ws).await["data"]["message"], "second");
    let sent = server.wait_for_push(1).await;
    assert_eq!(sent[0].body, "second");
}

#[tokio::test]
async fn test_disconnect_clears_pairing_so_push_resumes() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;
    server.add_push_token(&bob, "ExponentPushToken[bob]").await;

    let mut bob_ws = server.connect_ws(&bob).await;
    bob_ws
        .send(client_event("enterConversation", json!({ "partner_id": alice.id })))
        .await
        .unwrap();
    bob_ws.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let presence = server
        .get_json(&alice, &format!("/api/presence/{}", bob.id))
        .await;
    assert_eq!(presence["online"], false);

    let body: Value = server
        .send_text(&alice, &bob.id, "are you gone?")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["delivered_live"], false);
    server.wait_for_push(1).await;
}

#[tokio::test]
async fn test_reconnect_supersedes_old_connection() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;

    let mut old_ws = server.connect_ws(&bob).await;
    let mut new_ws = server.connect_ws(&bob).await;

    let notice = next_event(&mut old_ws).await;
    assert_eq!(notice["event"], "superseded");
    let close = tokio::time::timeout(Duration::from_secs(2), old_ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match close {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4000),
        other => panic!("expected close frame, got {:?}", other),
    }
    drop(old_ws);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The old connection ending must not take the new one offline
    let presence = server
        .get_json(&alice, &format!("/api/presence/{}", bob.id))
        .await;
    assert_eq!(presence["online"], true);

    server.send_text(&alice, &bob.id, "hi again").await;
    assert_eq!(next_event(&mut new_ws).await["data"]["message"], "hi again");
}

#[tokio::test]
async fn test_read_receipt_reaches_sender() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;
    let mut alice_ws = server.connect_ws(&alice).await;

    server.send_text(&alice, &bob.id, "ping").await;
    server
        .client
        .post(format!("{}/api/chat/read/{}", server.base_url, alice.id))
        .bearer_auth(&bob.token)
        .send()
        .await
        .unwrap();

    let event = next_event(&mut alice_ws).await;
    assert_eq!(event["event"], "messagesRead");
    assert_eq!(event["data"]["reader_id"], bob.id.as_str());
    assert_eq!(event["data"]["count"], 1);
}

#[tokio::test]
async fn test_call_handshake_over_websocket() {
    let server = start_test_server().await;
    let alice = server.register("Alice").await;
    let bob = server.register("Bob").await;
    let mut alice_ws = server.connect_ws(&alice).await;
    let mut bob_ws = server.connect_ws(&bob).await;

    alice_ws
        .send(client_event(
            "invite",
            json!({ "to": bob.id, "kind": "call", "payload": { "sdp": "offer" } }),
        ))
        .await
        .unwrap();
    assert_eq!(next_event(&mut alice_ws).await["event"], "inviteSent");

    let incoming = next_event(&mut bob_ws).await;
    assert_eq!(incoming["event"], "incomingInvite");
    assert_eq!(incoming["data"]["from"], alice.id.as_str());
    assert_eq!(incoming["data"]["kind"], "call");
    let invitation_id = incoming["data"]["invitation_id"].clone();

    let answer = json!({
        "invitation_id": invitation_id,
        "from": alice.id,
        "accept": true,
        "payload": { "sdp": "answer" },
    });
    bob_ws.send(client_event("answerInvite", answer.clone())).await.unwrap();
    assert_eq!(next_event(&mut alice_ws).await["event"], "inviteAccepted");

    // A second answer to the same invitation is refused
    bob_ws.send(client_event("answerInvite", answer)).await.unwrap();
    let refused = next_event(&mut bob_ws).await;
    assert_eq!(refused["event"], "error");
    assert_eq!(refused["data"]["message"], "invitation not found");

    alice_ws
        .send(client_event("takeAnswer", json!({ "from": bob.id })))
        .await
        .unwrap();
    let collected = next_event(&mut alice_ws).await;
    assert_eq!(collected["event"], "answer");
    assert_eq!(collected["data"]["payload"]["sdp"], "answer");

    // Bob dropping ends the call for Alice
    bob_ws.close(None).await.unwrap();
    let ended = next_event(&mut alice_ws).await;
    assert_eq!(ended["event"], "sessionEnded");
    assert_eq!(ended["data"]["reason"], "disconnected");
    assert_no_event(&mut alice_ws, Duration::from_millis(200)).await;
}
