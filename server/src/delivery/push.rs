//! Push notification dispatch.
//!
//! Best-effort: malformed tokens are skipped before dispatch, messages are
//! sent in chunks, and a failed chunk or a rejected ticket is logged without
//! affecting the others.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::PushConfig;
use crate::db::models::{Message, MessageType, UserProfile};

/// Gateway limit on notifications per request.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push gateway rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Per-destination outcome reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushTicket {
    Ok {
        id: String,
    },
    Error {
        message: String,
        #[serde(default)]
        details: Option<Value>,
    },
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_batch(&self, batch: &[PushMessage]) -> Result<Vec<PushTicket>, PushError>;
}

/// Notification content before it is addressed to individual tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl Notification {
    pub fn for_message(sender: &UserProfile, message: &Message) -> Self {
        let title = if sender.name.trim().is_empty() {
            "New Message".to_string()
        } else {
            format!("{} sent you a message", sender.name)
        };
        let body = match message.message_type {
            MessageType::Text => message.body.clone(),
            other => format!("You have received a new {} file.", other),
        };

        Self {
            title,
            body,
            data: json!({
                "type": "chat_message",
                "senderId": sender.id,
            }),
        }
    }

    fn addressed_to(&self, token: &str) -> PushMessage {
        PushMessage {
            to: token.to_string(),
            sound: "default",
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

/// Accepts `ExponentPushToken[...]`, `ExpoPushToken[...]`, or a bare
/// 8-4-4-4-12 alphanumeric device id.
pub fn is_valid_push_token(token: &str) -> bool {
    let bracketed = (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']');
    bracketed || is_device_id(token)
}

fn is_device_id(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(group, len)| group.len() == len && group.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Address `notification` to every valid token and send it in chunks.
/// Returns the tickets of every chunk the gateway accepted.
pub async fn send_push_notification(
    gateway: &dyn PushGateway,
    tokens: &[String],
    notification: &Notification,
    chunk_size: usize,
) -> Vec<PushTicket> {
    let messages: Vec<PushMessage> = tokens
        .iter()
        .filter(|token| {
            let valid = is_valid_push_token(token);
            if !valid {
                tracing::warn!(token = %token, "Skipping invalid push token");
            }
            valid
        })
        .map(|token| notification.addressed_to(token))
        .collect();

    let mut tickets = Vec::with_capacity(messages.len());
    for chunk in messages.chunks(chunk_size.max(1)) {
        match gateway.send_batch(chunk).await {
            Ok(batch) => {
                if !batch.is_empty() && batch.len() != chunk.len() {
                    tracing::warn!(
                        expected = chunk.len(),
                        received = batch.len(),
                        "Push gateway returned a mismatched ticket count"
                    );
                }
                for (ticket, message) in batch.iter().zip(chunk) {
                    if let PushTicket::Error { message: reason, .. } = ticket {
                        tracing::warn!(token = %message.to, reason = %reason, "Push ticket rejected");
                    }
                }
                tickets.extend(batch);
            }
            Err(e) => {
                tracing::warn!(error = %e, chunk_len = chunk.len(), "Failed to send push chunk");
            }
        }
    }

    tracing::debug!(
        tokens = tokens.len(),
        sent = messages.len(),
        tickets = tickets.len(),
        "Push dispatch finished"
    );
    tickets
}

/// Response body of an Expo-compatible endpoint. A request rejected as a
/// whole comes back with `errors` and no `data`, even on HTTP 200.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
    #[serde(default)]
    errors: Vec<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl GatewayResponse {
    fn into_tickets(self, status: u16) -> Result<Vec<PushTicket>, PushError> {
        if self.errors.is_empty() {
            return Ok(self.data);
        }
        let body = self
            .errors
            .iter()
            .map(|e| match &e.code {
                Some(code) => format!("{}: {}", code, e.message),
                None => e.message.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(PushError::Rejected { status, body })
    }
}

/// HTTP client for an Expo-compatible push endpoint.
pub struct ExpoGateway {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl ExpoGateway {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("parley-server/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl PushGateway for ExpoGateway {
    async fn send_batch(&self, batch: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(batch);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GatewayResponse = response.json().await?;
        parsed.into_tickets(status.as_u16())
    }
}

/// Used when push is disabled in config. Drops every batch.
pub struct DisabledGateway;

#[async_trait]
impl PushGateway for DisabledGateway {
    async fn send_batch(&self, batch: &[PushMessage]) -> Result<Vec<PushTicket>, PushError> {
        tracing::debug!(count = batch.len(), "Push disabled, dropping batch");
        Ok(Vec::new())
    }
}
