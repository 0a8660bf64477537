//! Message persistence.
//!
//! Every write here touches the chat summary too, and both happen in one
//! immediate transaction: a message is never visible without its chat
//! reflecting it, and a failure leaves neither changed.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use tutorlink_shared::types::{ChatId, MessageId, MessageType, PairKey, UserId};
use tutorlink_shared::validation::FileRef;

use crate::chats;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::filter::SqlFilter;
use crate::models::{Chat, Message, NewMessage};
use crate::rows;

const MESSAGE_COLUMNS: &str = "messages.id, messages.chat_id, messages.sender_id,
     messages.receiver_id, messages.body, messages.type, messages.is_read, messages.created_at,
     messages.file_name, messages.file_mime, messages.file_size";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a message and fold it into the chat of its sender/receiver
    /// pair, creating the chat on first contact.
    ///
    /// `attempts` bounds how often a lost race on the chat pair index is
    /// retried before giving up with [`StoreError::Conflict`].
    pub fn insert_message(&self, new: &NewMessage, attempts: u32) -> Result<(Message, Chat)> {
        let pair = PairKey::new(new.sender_id, new.receiver_id)?;

        self.immediate(|tx| {
            let chat_id = chats::upsert_for_message(tx, &pair, new, attempts)?;
            let message = Message {
                id: MessageId::new(),
                chat_id,
                sender_id: new.sender_id,
                receiver_id: new.receiver_id,
                kind: new.kind,
                body: new.body.clone(),
                file: new.file.clone(),
                is_read: false,
                created_at: new.created_at,
            };
            let file = message.file.as_ref();
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, receiver_id, body, type, is_read,
                                       created_at, file_name, file_mime, file_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10)",
                params![
                    message.id.to_string(),
                    chat_id.to_string(),
                    message.sender_id.to_string(),
                    message.receiver_id.to_string(),
                    message.body,
                    message.kind.as_str(),
                    rows::ts(&message.created_at),
                    file.map(|f| f.name.as_str()),
                    file.map(|f| f.mime_type.as_str()),
                    file.map(|f| f.size as i64),
                ],
            )?;
            let chat = chats::fetch_chat(tx, chat_id)?;
            Ok((message, chat))
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        fetch_message(self.conn(), id)
    }

    /// Fetch a message only if `filter` admits it.
    pub fn find_message(&self, id: MessageId, filter: &SqlFilter) -> Result<Option<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE messages.id = ? AND ({})",
            filter.clause
        );
        let mut values = vec![SqlValue::Text(id.to_string())];
        values.extend(filter.params.iter().cloned());
        let message = self
            .conn()
            .query_row(&sql, params_from_iter(values), row_to_message)
            .optional()?;
        Ok(message)
    }

    /// A page of the chat's messages admitted by `filter`, newest first.
    pub fn list_messages(
        &self,
        chat_id: ChatId,
        filter: &SqlFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE messages.chat_id = ? AND ({})
             ORDER BY messages.created_at DESC, messages.rowid DESC
             LIMIT ? OFFSET ?",
            filter.clause
        );
        let mut values = vec![SqlValue::Text(chat_id.to_string())];
        values.extend(filter.params.iter().cloned());
        values.push(SqlValue::Integer(i64::from(limit)));
        values.push(SqlValue::Integer(i64::from(offset)));

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Unread messages addressed to `user` in the chat, counted from the
    /// message log rather than the summary.
    pub fn count_unread(&self, chat_id: ChatId, user: UserId) -> Result<u32> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![chat_id.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Mark one message read and take it off the receiver's unread counter.
    ///
    /// Returns the message and whether anything changed; marking an already
    /// read message is a no-op.
    pub fn mark_message_read(&self, id: MessageId) -> Result<(Message, bool)> {
        self.immediate(|tx| {
            let message = fetch_message(tx, id)?;
            let affected = tx.execute(
                "UPDATE messages SET is_read = 1 WHERE id = ?1 AND is_read = 0",
                params![id.to_string()],
            )?;
            if affected == 0 {
                return Ok((message, false));
            }

            let chat = chats::fetch_chat(tx, message.chat_id)?;
            chats::decrement_unread(tx, &chat, message.receiver_id)?;
            Ok((
                Message {
                    is_read: true,
                    ..message
                },
                true,
            ))
        })
    }

    /// Mark the messages addressed to `reader` in the chat read, limited to
    /// those `filter` admits, and bring their counter back in line with the
    /// log. Returns how many messages changed.
    pub fn mark_chat_read(&self, chat_id: ChatId, reader: UserId, filter: &SqlFilter) -> Result<u32> {
        self.immediate(|tx| {
            let chat = chats::fetch_chat(tx, chat_id)?;
            let sql = format!(
                "UPDATE messages SET is_read = 1
                 WHERE messages.chat_id = ? AND messages.receiver_id = ? AND messages.is_read = 0
                   AND ({})",
                filter.clause
            );
            let mut values = vec![
                SqlValue::Text(chat_id.to_string()),
                SqlValue::Text(reader.to_string()),
            ];
            values.extend(filter.params.iter().cloned());
            let affected = tx.execute(&sql, params_from_iter(values))?;
            chats::recount_unread(tx, &chat, reader)?;
            Ok(u32::try_from(affected).unwrap_or(u32::MAX))
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a message, keeping the chat summary in step. Reports on the
    /// message go with it. Returns `false` if the message did not exist.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.immediate(|tx| {
            let message = match fetch_message(tx, id) {
                Ok(m) => m,
                Err(StoreError::NotFound) => return Ok(false),
                Err(e) => return Err(e),
            };
            let chat = chats::fetch_chat(tx, message.chat_id)?;

            tx.execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;

            if !message.is_read {
                chats::decrement_unread(tx, &chat, message.receiver_id)?;
            }
            if message.created_at >= chat.last_timestamp {
                chats::refresh_summary(tx, chat.id)?;
            }
            Ok(true)
        })
    }
}

fn fetch_message(conn: &Connection, id: MessageId) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        params![id.to_string()],
        row_to_message,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let file_name: Option<String> = row.get(8)?;
    let file_mime: Option<String> = row.get(9)?;
    let file_size: Option<i64> = row.get(10)?;

    let file = match (file_name, file_mime) {
        (Some(name), Some(mime_type)) => Some(FileRef {
            name,
            mime_type,
            size: file_size.unwrap_or(0).max(0) as u64,
        }),
        _ => None,
    };

    Ok(Message {
        id: rows::id(row, 0)?,
        chat_id: rows::id(row, 1)?,
        sender_id: rows::id(row, 2)?,
        receiver_id: rows::id(row, 3)?,
        body: row.get(4)?,
        kind: rows::enumeration(row, 5, MessageType::parse)?,
        is_read: row.get(6)?,
        created_at: rows::timestamp(row, 7)?,
        file,
    })
}
