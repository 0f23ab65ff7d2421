use crate::db;
use crate::model::ChatMessage;
use crate::users;
use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Advisory message lifetime; expired rows are never purged.
const EXPIRY_SECS: i64 = 24 * 60 * 60;

/// Canonical conversation key: both participant ids sorted and joined, so
/// either side computes the same id.
pub fn conversation_id(a: &Uuid, b: &Uuid) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// Append a message to the conversation between `from` and `to`.
pub fn send_message(conn: &Connection, from: &Uuid, to: &Uuid, text: &str) -> Result<ChatMessage> {
    let text = text.trim();
    if text.is_empty() {
        return Err(anyhow!("empty_message"));
    }
    let sender = users::get_user(conn, from)?.ok_or_else(|| anyhow!("missing_profile"))?;
    let id = Uuid::new_v4();
    let conversation_id = conversation_id(from, to);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let expire_at = now + EXPIRY_SECS;
    conn.execute(
        "INSERT INTO messages (id, conversation_id, from_id, to_id, text, created_at, expire_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id.to_string(),
            conversation_id,
            from.to_string(),
            to.to_string(),
            text,
            now,
            expire_at
        ],
    )?;
    Ok(ChatMessage {
        id,
        conversation_id,
        from_id: *from,
        from_username: sender.username,
        to_id: *to,
        text: text.into(),
        created_at: now,
        expire_at,
    })
}

/// All messages in a conversation, oldest first, with sender names resolved
/// in the same query.
pub fn list_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.from_id, COALESCE(u.username, m.from_id), \
                m.to_id, m.text, m.created_at, m.expire_at \
         FROM messages m LEFT JOIN users u ON u.id = m.from_id \
         WHERE m.conversation_id = ?1 ORDER BY m.created_at ASC, m.id ASC",
    )?;
    let msgs = stmt
        .query_map([conversation_id], |row| {
            Ok(ChatMessage {
                id: db::uuid_column(row, 0)?,
                conversation_id: row.get(1)?,
                from_id: db::uuid_column(row, 2)?,
                from_username: row.get(3)?,
                to_id: db::uuid_column(row, 4)?,
                text: row.get(5)?,
                created_at: row.get(6)?,
                expire_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(msgs)
}

/// Live message feeds, one broadcast channel per conversation.
///
/// A feed is cancelled by dropping it; a client switching conversations
/// replaces its handle, so it holds at most one live feed at a time.
#[derive(Default)]
pub struct ConversationHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChatMessage>>>,
}

pub struct ConversationFeed {
    rx: broadcast::Receiver<ChatMessage>,
}

impl ConversationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, conversation_id: &str) -> ConversationFeed {
        let mut guard = self.channels.lock();
        let tx = guard
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(100).0);
        ConversationFeed { rx: tx.subscribe() }
    }

    pub fn publish(&self, msg: &ChatMessage) {
        let mut guard = self.channels.lock();
        let dead = match guard.get(&msg.conversation_id) {
            Some(tx) => tx.send(msg.clone()).is_err(),
            None => return,
        };
        if dead {
            // every feed dropped; forget the channel
            guard.remove(&msg.conversation_id);
        }
    }
}

impl ConversationFeed {
    /// Next live message, or None once the channel is gone. Skips over
    /// anything missed while lagging.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
