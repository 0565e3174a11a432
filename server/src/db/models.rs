/// Database row types.
/// These correspond to the SQLite schema defined in migrations.rs.
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of content a direct message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Doc,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Doc => "doc",
        }
    }

    /// Every type except text must reference an uploaded file.
    pub fn requires_file(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message type `{0}`")]
pub struct UnknownMessageType(pub String);

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "doc" => Ok(Self::Doc),
            other => Err(UnknownMessageType(other.to_string())),
        }
    }
}

impl ToSql for MessageType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// User record in the users table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub profile_image: Option<String>,
}

/// Direct message as persisted and as delivered to clients.
///
/// `read` only moves from false to true. Soft deletions live in
/// `message_deletions` and are filtered per requester at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(rename = "message")]
    pub body: String,
    pub file_url: Option<String>,
    /// Unix millis
    pub timestamp: i64,
    pub read: bool,
}

/// Validated message ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub message_type: MessageType,
    pub body: String,
    pub file_url: Option<String>,
}

/// One row of the conversation list: the latest visible message exchanged
/// with `partner_id` plus how many of the partner's messages are unread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub partner_id: String,
    pub name: String,
    pub profile_image: Option<String>,
    pub last_message: String,
    pub last_message_type: MessageType,
    /// Unix millis
    pub last_message_time: i64,
    pub unread_count: u64,
}
