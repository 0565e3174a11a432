//! Presence-aware message delivery.
//!
//! For each new message: validate, persist, push live to the receiver's
//! session if they have one, then decide whether an out-of-band push
//! notification is warranted. The phases are independent: a failed push
//! never undoes persistence or live delivery, and push dispatch runs on a
//! detached task so the sender's acknowledgement does not wait for it.

pub mod fanout;
pub mod push;

use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::chat::store::MessageStore;
use crate::db::models::{Message, MessageType, NewMessage, UserProfile};
use crate::error::ChatError;
use crate::presence::{PairingTracker, SessionRegistry};
use fanout::LiveFanout;
use push::{send_push_notification, Notification, PushGateway, PushTicket};

/// Event name used for live delivery of a new message.
pub const RECEIVE_MESSAGE_EVENT: &str = "receiveMessage";

/// Reference to an already-uploaded file.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub url: String,
    pub original_name: String,
}

/// A send request as it arrives from the sender, before validation.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub receiver_id: String,
    pub message_type: String,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    fn validate(self, sender_id: &str) -> Result<NewMessage, ChatError> {
        if self.receiver_id.trim().is_empty() {
            return Err(ChatError::Validation("receiver_id is required".into()));
        }
        let message_type: MessageType = self
            .message_type
            .parse()
            .map_err(|e: crate::db::models::UnknownMessageType| ChatError::Validation(e.to_string()))?;

        let (body, file_url) = if message_type.requires_file() {
            let attachment = self.attachment.ok_or_else(|| {
                ChatError::Validation(format!("file is required for {} messages", message_type))
            })?;
            (attachment.original_name, Some(attachment.url))
        } else {
            let text = self.text.unwrap_or_default();
            if text.trim().is_empty() {
                return Err(ChatError::Validation("message text is required".into()));
            }
            (text, None)
        };

        Ok(NewMessage {
            sender_id: sender_id.to_string(),
            receiver_id: self.receiver_id,
            message_type,
            body,
            file_url,
        })
    }
}

/// What happened to the push phase of a delivery.
#[derive(Debug)]
pub enum PushPlan {
    /// Receiver has no registered push destinations.
    NoDestinations,
    /// Receiver is looking at the conversation with the sender.
    Suppressed,
    /// Dispatch is running in the background.
    Scheduled(JoinHandle<Vec<PushTicket>>),
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    /// The message was queued on the receiver's live session.
    pub live: bool,
    pub push: PushPlan,
}

#[derive(Clone)]
pub struct DeliveryCoordinator {
    store: MessageStore,
    sessions: SessionRegistry,
    pairings: PairingTracker,
    fanout: Arc<dyn LiveFanout>,
    push: Arc<dyn PushGateway>,
    push_chunk_size: usize,
}

impl DeliveryCoordinator {
    pub fn new(
        store: MessageStore,
        sessions: SessionRegistry,
        pairings: PairingTracker,
        fanout: Arc<dyn LiveFanout>,
        push: Arc<dyn PushGateway>,
        push_chunk_size: usize,
    ) -> Self {
        Self {
            store,
            sessions,
            pairings,
            fanout,
            push,
            push_chunk_size,
        }
    }

    /// Validate, persist and deliver a message from `sender_id`.
    ///
    /// Validation and storage failures abort before anything is delivered.
    /// Once the message is stored the call succeeds regardless of how
    /// live or push delivery fare.
    pub async fn send_message(
        &self,
        sender_id: &str,
        outgoing: OutgoingMessage,
    ) -> Result<(Message, DeliveryOutcome), ChatError> {
        let new = outgoing.validate(sender_id)?;
        let sender = self
            .store
            .find_user(sender_id)
            .await?
            .ok_or(ChatError::NotFound("sender"))?;

        let message = self.store.create_message(new).await?;
        tracing::info!(
            message_id = %message.id,
            sender_id = %message.sender_id,
            receiver_id = %message.receiver_id,
            message_type = %message.message_type,
            "Message stored"
        );

        let outcome = self.deliver(&sender, &message).await;
        Ok((message, outcome))
    }

    /// Live fan-out plus push decision for an already persisted message.
    pub async fn deliver(&self, sender: &UserProfile, message: &Message) -> DeliveryOutcome {
        let receiver_id = message.receiver_id.as_str();

        let live = self.sessions.is_online(receiver_id)
            && self.fanout.emit(receiver_id, RECEIVE_MESSAGE_EVENT, json!(message));

        let push = self.plan_push(sender, message).await;
        match &push {
            PushPlan::NoDestinations => {
                tracing::debug!(receiver_id = %receiver_id, live, "No push destinations")
            }
            PushPlan::Suppressed => tracing::debug!(
                receiver_id = %receiver_id,
                sender_id = %sender.id,
                live,
                "Push suppressed, receiver is viewing the conversation"
            ),
            PushPlan::Scheduled(_) => {
                tracing::debug!(receiver_id = %receiver_id, live, "Push dispatch scheduled")
            }
        }

        DeliveryOutcome { live, push }
    }

    async fn plan_push(&self, sender: &UserProfile, message: &Message) -> PushPlan {
        let tokens = match self.store.push_tokens(&message.receiver_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    receiver_id = %message.receiver_id,
                    error = %e,
                    "Could not load push destinations, skipping push"
                );
                return PushPlan::NoDestinations;
            }
        };
        if tokens.is_empty() {
            return PushPlan::NoDestinations;
        }

        if self
            .pairings
            .is_actively_viewing(&message.receiver_id, &message.sender_id)
        {
            return PushPlan::Suppressed;
        }

        let notification = Notification::for_message(sender, message);
        let gateway = self.push.clone();
        let chunk_size = self.push_chunk_size;
        PushPlan::Scheduled(tokio::spawn(async move {
            send_push_notification(gateway.as_ref(), &tokens, &notification, chunk_size).await
        }))
    }
}
