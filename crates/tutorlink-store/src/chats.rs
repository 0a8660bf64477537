//! Chat summary rows, one per unordered user pair.
//!
//! A chat is never written on its own: the helpers at the bottom of this file
//! run inside the transaction of the message write that changes it (see
//! `messages.rs`).

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};

use tutorlink_shared::constants::MAX_SNIPPET_CHARS;
use tutorlink_shared::types::{ChatId, MessageType, PairKey, PairSide, UserId};
use tutorlink_shared::validation::summary_snippet;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::filter::SqlFilter;
use crate::models::{Chat, NewMessage};
use crate::rows;

const CHAT_COLUMNS: &str = "chats.id, chats.user1_id, chats.user2_id, chats.last_message,
     chats.last_message_type, chats.last_sender_id, chats.last_timestamp,
     chats.unread_count_user1, chats.unread_count_user2";

impl Database {
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        fetch_chat(self.conn(), id)
    }

    /// Fetch a chat only if `filter` admits it.
    pub fn find_chat(&self, id: ChatId, filter: &SqlFilter) -> Result<Option<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE chats.id = ? AND ({})",
            filter.clause
        );
        let mut values = vec![SqlValue::Text(id.to_string())];
        values.extend(filter.params.iter().cloned());
        let chat = self
            .conn()
            .query_row(&sql, params_from_iter(values), row_to_chat)
            .optional()?;
        Ok(chat)
    }

    /// The chat of `pair`, if a message was ever exchanged.
    pub fn chat_for_pair(&self, pair: &PairKey) -> Result<Option<Chat>> {
        chat_for_pair(self.conn(), pair)
    }

    /// Chats admitted by `filter`, most recently active first.
    pub fn list_chats(&self, filter: &SqlFilter) -> Result<Vec<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE {} ORDER BY chats.last_timestamp DESC",
            filter.clause
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.params.iter()), row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

pub(crate) fn fetch_chat(conn: &Connection, id: ChatId) -> Result<Chat> {
    conn.query_row(
        &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
        params![id.to_string()],
        row_to_chat,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    })
}

fn chat_for_pair(conn: &Connection, pair: &PairKey) -> Result<Option<Chat>> {
    let chat = conn
        .query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE user1_id = ?1 AND user2_id = ?2"),
            params![pair.first().to_string(), pair.second().to_string()],
            row_to_chat,
        )
        .optional()?;
    Ok(chat)
}

fn unread_column(side: PairSide) -> &'static str {
    match side {
        PairSide::First => "unread_count_user1",
        PairSide::Second => "unread_count_user2",
    }
}

fn receiver_column(pair: &PairKey, receiver: UserId) -> Result<&'static str> {
    pair.side_of(receiver)
        .map(unread_column)
        .ok_or_else(|| StoreError::Conflict(format!("{receiver} is not a member of chat {pair}")))
}

/// Record `message` in the summary of `pair`, creating the chat on first
/// contact, and return the chat id.
///
/// The update runs first; when no row exists an insert follows. An insert
/// that loses a race on the pair index turns into another update, at most
/// `attempts` times.
pub(crate) fn upsert_for_message(
    tx: &Transaction<'_>,
    pair: &PairKey,
    message: &NewMessage,
    attempts: u32,
) -> Result<ChatId> {
    let column = receiver_column(pair, message.receiver_id)?;
    let snippet = summary_snippet(message.body.as_deref());
    let timestamp = rows::ts(&message.created_at);

    for attempt in 1..=attempts.max(1) {
        let updated = tx.execute(
            &format!(
                "UPDATE chats
                 SET last_message = ?3, last_message_type = ?4, last_sender_id = ?5,
                     last_timestamp = ?6, {column} = {column} + 1
                 WHERE user1_id = ?1 AND user2_id = ?2"
            ),
            params![
                pair.first().to_string(),
                pair.second().to_string(),
                snippet,
                message.kind.as_str(),
                message.sender_id.to_string(),
                timestamp,
            ],
        )?;
        if updated == 1 {
            if let Some(chat) = chat_for_pair(tx, pair)? {
                return Ok(chat.id);
            }
        }

        let id = ChatId::new();
        let inserted = tx.execute(
            &format!(
                "INSERT INTO chats (id, user1_id, user2_id, last_message, last_message_type,
                                    last_sender_id, last_timestamp, {column})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)"
            ),
            params![
                id.to_string(),
                pair.first().to_string(),
                pair.second().to_string(),
                snippet,
                message.kind.as_str(),
                message.sender_id.to_string(),
                timestamp,
            ],
        );
        match inserted {
            Ok(_) => {
                tracing::debug!(chat = %id, pair = %pair, "chat created");
                return Ok(id);
            }
            Err(e) => {
                let err = StoreError::from(e);
                if !err.is_unique_violation() {
                    return Err(err);
                }
                tracing::debug!(pair = %pair, attempt, "chat insert lost race, retrying as update");
            }
        }
    }

    Err(StoreError::Conflict(format!(
        "chat for {pair} could not be written after {attempts} attempts"
    )))
}

/// Take one unread message off `receiver`'s counter, never below zero.
pub(crate) fn decrement_unread(tx: &Transaction<'_>, chat: &Chat, receiver: UserId) -> Result<()> {
    let pair = chat_pair(chat)?;
    let column = receiver_column(&pair, receiver)?;
    tx.execute(
        &format!("UPDATE chats SET {column} = MAX({column} - 1, 0) WHERE id = ?1"),
        params![chat.id.to_string()],
    )?;
    Ok(())
}

/// Set `user`'s counter to the number of unread messages addressed to them.
pub(crate) fn recount_unread(tx: &Transaction<'_>, chat: &Chat, user: UserId) -> Result<()> {
    let pair = chat_pair(chat)?;
    let column = receiver_column(&pair, user)?;
    tx.execute(
        &format!(
            "UPDATE chats SET {column} = (
                 SELECT COUNT(*) FROM messages
                 WHERE chat_id = ?1 AND receiver_id = ?2 AND is_read = 0)
             WHERE id = ?1"
        ),
        params![chat.id.to_string(), user.to_string()],
    )?;
    Ok(())
}

/// Point the summary at the newest message left in the chat. With no
/// messages left the snippet is cleared and the rest is kept.
pub(crate) fn refresh_summary(tx: &Transaction<'_>, chat_id: ChatId) -> Result<()> {
    let updated = tx.execute(
        &format!(
            "UPDATE chats
             SET (last_message, last_message_type, last_sender_id, last_timestamp) = (
                 SELECT SUBSTR(m.body, 1, {MAX_SNIPPET_CHARS}), m.type, m.sender_id, m.created_at
                 FROM messages m WHERE m.chat_id = chats.id
                 ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1)
             WHERE id = ?1 AND EXISTS (SELECT 1 FROM messages WHERE chat_id = ?1)"
        ),
        params![chat_id.to_string()],
    )?;
    if updated == 0 {
        tx.execute(
            "UPDATE chats SET last_message = NULL WHERE id = ?1",
            params![chat_id.to_string()],
        )?;
    }
    Ok(())
}

fn chat_pair(chat: &Chat) -> Result<PairKey> {
    chat.pair()
        .ok_or_else(|| StoreError::Conflict(format!("chat {} has identical participants", chat.id)))
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: rows::id(row, 0)?,
        user1_id: rows::id(row, 1)?,
        user2_id: rows::id(row, 2)?,
        last_message: row.get(3)?,
        last_message_type: rows::enumeration(row, 4, MessageType::parse)?,
        last_sender_id: rows::id(row, 5)?,
        last_timestamp: rows::timestamp(row, 6)?,
        unread_count_user1: rows::count(row, 7)?,
        unread_count_user2: rows::count(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_user, text_from};
    use tutorlink_shared::types::Role;

    #[test]
    fn pair_lookup_is_direction_independent() {
        let db = Database::open_in_memory().unwrap();
        let a = sample_user(Role::Student);
        let b = sample_user(Role::Tutor);
        db.insert_user(&a).unwrap();
        db.insert_user(&b).unwrap();

        let (_, chat) = db.insert_message(&text_from(a.id, b.id, "hi"), 3).unwrap();
        let (_, again) = db.insert_message(&text_from(b.id, a.id, "hello"), 3).unwrap();
        assert_eq!(chat.id, again.id);

        let forward = db.chat_for_pair(&PairKey::new(a.id, b.id).unwrap()).unwrap();
        let backward = db.chat_for_pair(&PairKey::new(b.id, a.id).unwrap()).unwrap();
        assert_eq!(forward.map(|c| c.id), Some(chat.id));
        assert_eq!(backward.map(|c| c.id), Some(chat.id));
    }

    #[test]
    fn list_respects_filter() {
        let db = Database::open_in_memory().unwrap();
        let a = sample_user(Role::Student);
        let b = sample_user(Role::Tutor);
        let c = sample_user(Role::Tutor);
        for u in [&a, &b, &c] {
            db.insert_user(u).unwrap();
        }
        db.insert_message(&text_from(a.id, b.id, "one"), 3).unwrap();
        db.insert_message(&text_from(b.id, c.id, "two"), 3).unwrap();

        let filter = SqlFilter {
            clause: "(chats.user1_id = ? OR chats.user2_id = ?)".into(),
            params: vec![SqlValue::Text(a.id.to_string()), SqlValue::Text(a.id.to_string())],
        };
        let chats = db.list_chats(&filter).unwrap();
        assert_eq!(chats.len(), 1);
        assert!(chats[0].has_participant(a.id));

        assert_eq!(db.list_chats(&SqlFilter::allow_all()).unwrap().len(), 2);
    }

    #[test]
    fn store_rejects_unordered_pair() {
        let db = Database::open_in_memory().unwrap();
        let a = sample_user(Role::Student);
        let b = sample_user(Role::Tutor);
        db.insert_user(&a).unwrap();
        db.insert_user(&b).unwrap();
        let pair = PairKey::new(a.id, b.id).unwrap();

        let err = db
            .conn()
            .execute(
                "INSERT INTO chats (id, user1_id, user2_id, last_message_type, last_sender_id,
                                    last_timestamp)
                 VALUES (?1, ?2, ?3, 'text', ?2, '2030-01-01T00:00:00.000000Z')",
                params![ChatId::new().to_string(), pair.second().to_string(), pair.first().to_string()],
            )
            .unwrap_err();
        assert!(StoreError::from(err).is_constraint_violation());
    }
}
