//! Shared harness: a full server on an ephemeral port with a recording
//! push gateway in place of the real one.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use parley_server::config::Config;
use parley_server::delivery::push::{PushError, PushGateway, PushMessage, PushTicket};
use parley_server::state::AppState;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Default)]
pub struct RecordingGateway {
    pub batches: Mutex<Vec<Vec<PushMessage>>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<PushMessage> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send_batch(&self, batch: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(batch
            .iter()
            .map(|m| PushTicket::Ok {
                id: format!("ticket-{}", m.to),
            })
            .collect())
    }
}

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub gateway: Arc<RecordingGateway>,
    pub client: reqwest::Client,
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

/// Start the server on a random port.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = parley_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let gateway = Arc::new(RecordingGateway::default());
    let config = Config {
        data_dir,
        public_base_url: "http://files.test".to_string(),
        ..Config::default()
    };
    let state = AppState::new(db, jwt_secret, gateway.clone(), &config);

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        gateway,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    pub async fn register(&self, name: &str) -> TestUser {
        let resp = self
            .client
            .post(format!("{}/api/users", self.base_url))
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201, "Registration failed for {}", name);
        let body: Value = resp.json().await.unwrap();
        TestUser {
            id: body["user"]["id"].as_str().unwrap().to_string(),
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn add_push_token(&self, user: &TestUser, token: &str) {
        let resp = self
            .client
            .post(format!("{}/api/users/push-tokens", self.base_url))
            .bearer_auth(&user.token)
            .json(&json!({ "token": token }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    pub async fn send_text(&self, from: &TestUser, to: &str, text: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/api/chat/messages", self.base_url))
            .bearer_auth(&from.token)
            .json(&json!({ "receiver_id": to, "type": "text", "message": text }))
            .send()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, user: &TestUser, path: &str) -> Value {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "GET {} failed", path);
        resp.json().await.unwrap()
    }

    pub async fn connect_ws(&self, user: &TestUser) -> WsStream {
        let url = format!("ws://{}/ws?token={}", self.addr, user.token);
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("Failed to connect WebSocket");
        // Let the actor register the session before the test moves on
        tokio::time::sleep(Duration::from_millis(100)).await;
        ws
    }

    /// Wait until at least `count` push messages were handed to the gateway.
    pub async fn wait_for_push(&self, count: usize) -> Vec<PushMessage> {
        for _ in 0..50 {
            let sent = self.gateway.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} push messages, got {}", count, self.gateway.sent().len());
    }
}

pub fn client_event(event: &str, data: Value) -> Message {
    Message::Text(json!({ "event": event, "data": data }).to_string().into())
}

/// Next JSON event on the socket, skipping control frames.
pub async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Assert nothing but control frames arrives within `wait`.
pub async fn assert_no_event(ws: &mut WsStream, wait: Duration) {
    if let Ok(Some(Ok(Message::Text(text)))) = tokio::time::timeout(wait, ws.next()).await {
        panic!("unexpected event: {}", text.as_str());
    }
}
