//! SQLite-backed message store.
//!
//! Every public method hops onto the blocking pool, takes the connection
//! lock for the duration of one statement group, and releases it before
//! returning. Nothing here touches the in-memory presence tables.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::db::models::{ConversationSummary, Message, MessageType, NewMessage, UserProfile};
use crate::db::DbPool;
use crate::error::ChatError;

const MESSAGE_COLUMNS: &str =
    "m.id, m.sender_id, m.receiver_id, m.message_type, m.body, m.file_url, m.is_read, m.created_at";

#[derive(Clone)]
pub struct MessageStore {
    db: DbPool,
}

impl MessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Connection) -> Result<T, ChatError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| ChatError::Storage("database lock poisoned".into()))?;
            f(&conn)
        })
        .await?
    }

    pub async fn create_user(
        &self,
        id: &str,
        name: &str,
        profile_image: Option<&str>,
    ) -> Result<UserProfile, ChatError> {
        let user = UserProfile {
            id: id.to_string(),
            name: name.to_string(),
            profile_image: profile_image.map(str::to_string),
        };
        let row = user.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (id, name, profile_image, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![row.id, row.name, row.profile_image, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await?;
        Ok(user)
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, ChatError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| Ok(find_user(conn, &user_id)?)).await
    }

    pub async fn push_tokens(&self, user_id: &str) -> Result<Vec<String>, ChatError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT token FROM push_tokens WHERE user_id = ?1 ORDER BY created_at ASC, token ASC",
            )?;
            let tokens = stmt
                .query_map(rusqlite::params![user_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(tokens)
        })
        .await
    }

    /// Returns false when the token was already registered.
    pub async fn add_push_token(&self, user_id: &str, token: &str) -> Result<bool, ChatError> {
        let user_id = user_id.to_string();
        let token = token.to_string();
        self.with_conn(move |conn| {
            if find_user(conn, &user_id)?.is_none() {
                return Err(ChatError::NotFound("user"));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO push_tokens (user_id, token, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, token, Utc::now().timestamp_millis()],
            )?;
            Ok(inserted > 0)
        })
        .await
    }

    pub async fn remove_push_token(&self, user_id: &str, token: &str) -> Result<bool, ChatError> {
        let user_id = user_id.to_string();
        let token = token.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM push_tokens WHERE user_id = ?1 AND token = ?2",
                rusqlite::params![user_id, token],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    /// Persist a message. The receiver is checked under the same lock as the
    /// insert so an unknown receiver never leaves an orphaned row behind.
    pub async fn create_message(&self, new: NewMessage) -> Result<Message, ChatError> {
        self.with_conn(move |conn| {
            if find_user(conn, &new.receiver_id)?.is_none() {
                return Err(ChatError::NotFound("receiver"));
            }
            Ok(insert_message(conn, &new, Utc::now().timestamp_millis())?)
        })
        .await
    }

    /// Messages exchanged between `a` and `b`, oldest first, minus those
    /// `requester` has soft-deleted.
    pub async fn find_messages(
        &self,
        a: &str,
        b: &str,
        requester: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let (a, b, requester) = (a.to_string(), b.to_string(), requester.to_string());
        self.with_conn(move |conn| Ok(find_messages(conn, &a, &b, &requester)?))
            .await
    }

    pub async fn count_unread(&self, sender: &str, receiver: &str) -> Result<u64, ChatError> {
        let (sender, receiver) = (sender.to_string(), receiver.to_string());
        self.with_conn(move |conn| Ok(count_unread(conn, &sender, &receiver)?))
            .await
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| Ok(list_conversations(conn, &user_id)?))
            .await
    }

    /// Mark every unread message from `partner` to `reader` as read.
    pub async fn mark_read(&self, reader: &str, partner: &str) -> Result<usize, ChatError> {
        let (reader, partner) = (reader.to_string(), partner.to_string());
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                rusqlite::params![partner, reader],
            )?;
            Ok(updated)
        })
        .await
    }

    /// Add `user_id` to the message's deleted-for set. Only a participant may
    /// hide a message; anyone else gets NotFound.
    pub async fn delete_for(&self, user_id: &str, message_id: &str) -> Result<(), ChatError> {
        let (user_id, message_id) = (user_id.to_string(), message_id.to_string());
        self.with_conn(move |conn| {
            let participants: Option<(String, String)> = conn
                .query_row(
                    "SELECT sender_id, receiver_id FROM messages WHERE id = ?1",
                    rusqlite::params![message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match participants {
                Some((sender, receiver)) if sender == user_id || receiver == user_id => {
                    conn.execute(
                        "INSERT OR IGNORE INTO message_deletions (message_id, user_id, deleted_at) VALUES (?1, ?2, ?3)",
                        rusqlite::params![message_id, user_id, Utc::now().timestamp_millis()],
                    )?;
                    Ok(())
                }
                _ => Err(ChatError::NotFound("message")),
            }
        })
        .await
    }
}

fn find_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<UserProfile>> {
    conn.query_row(
        "SELECT id, name, profile_image FROM users WHERE id = ?1",
        rusqlite::params![user_id],
        |row| {
            Ok(UserProfile {
                id: row.get(0)?,
                name: row.get(1)?,
                profile_image: row.get(2)?,
            })
        },
    )
    .optional()
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        message_type: row.get(3)?,
        body: row.get(4)?,
        file_url: row.get(5)?,
        read: row.get(6)?,
        timestamp: row.get(7)?,
    })
}

fn insert_message(conn: &Connection, new: &NewMessage, created_at: i64) -> rusqlite::Result<Message> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, message_type, body, file_url, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        rusqlite::params![
            id,
            new.sender_id,
            new.receiver_id,
            new.message_type,
            new.body,
            new.file_url,
            created_at,
        ],
    )?;

    Ok(Message {
        id,
        sender_id: new.sender_id.clone(),
        receiver_id: new.receiver_id.clone(),
        message_type: new.message_type,
        body: new.body.clone(),
        file_url: new.file_url.clone(),
        timestamp: created_at,
        read: false,
    })
}

fn find_messages(
    conn: &Connection,
    a: &str,
    b: &str,
    requester: &str,
) -> rusqlite::Result<Vec<Message>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages m
         WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2) OR (m.sender_id = ?2 AND m.receiver_id = ?1))
           AND NOT EXISTS (
               SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?3
           )
         ORDER BY m.created_at ASC, m.id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let messages: rusqlite::Result<Vec<Message>> = stmt
        .query_map(rusqlite::params![a, b, requester], message_from_row)?
        .collect();
    messages
}

/// Unread messages from `sender` to `receiver` that the receiver still sees.
fn count_unread(conn: &Connection, sender: &str, receiver: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages m
         WHERE m.sender_id = ?1 AND m.receiver_id = ?2 AND m.is_read = 0
           AND NOT EXISTS (
               SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?2
           )",
        rusqlite::params![sender, receiver],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn list_conversations(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "WITH visible AS (
             SELECT m.id, m.sender_id, m.receiver_id, m.message_type, m.body, m.is_read, m.created_at,
                    CASE WHEN m.sender_id = ?1 THEN m.receiver_id ELSE m.sender_id END AS partner_id
             FROM messages m
             WHERE (m.sender_id = ?1 OR m.receiver_id = ?1)
               AND NOT EXISTS (
                   SELECT 1 FROM message_deletions d WHERE d.message_id = m.id AND d.user_id = ?1
               )
         ),
         ranked AS (
             SELECT visible.*,
                    ROW_NUMBER() OVER (PARTITION BY partner_id ORDER BY created_at DESC, id DESC) AS rn
             FROM visible
         )
         SELECT r.partner_id, u.name, u.profile_image, r.body, r.message_type, r.created_at,
                (SELECT COUNT(*) FROM visible v
                  WHERE v.sender_id = r.partner_id AND v.receiver_id = ?1 AND v.is_read = 0)
         FROM ranked r
         LEFT JOIN users u ON u.id = r.partner_id
         WHERE r.rn = 1
         ORDER BY r.created_at DESC, r.id DESC",
    )?;

    let conversations: rusqlite::Result<Vec<ConversationSummary>> = stmt
        .query_map(rusqlite::params![user_id], |row| {
            let unread: i64 = row.get(6)?;
            Ok(ConversationSummary {
                partner_id: row.get(0)?,
                name: row
                    .get::<_, Option<String>>(1)?
                    .unwrap_or_else(|| "Unknown".to_string()),
                profile_image: row.get(2)?,
                last_message: row.get(3)?,
                last_message_type: row.get::<_, MessageType>(4)?,
                last_message_time: row.get(5)?,
                unread_count: unread as u64,
            })
        })?
        .collect();
    conversations
}
