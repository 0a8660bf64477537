//! Direct messages and the per-pair chat summaries derived from them.
//!
//! Chats are never written directly. Every message write updates the
//! summary of its pair (last message, unread counters) in the same store
//! transaction, so at any point a chat's counter for a user equals the
//! number of unread messages addressed to them.

use serde::{Deserialize, Serialize};

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::types::{
    timestamp_now, ChatId, MessageId, MessageType, PairKey, UserId,
};
use tutorlink_shared::validation::{validate_message_content, FileRef};
use tutorlink_store::{Chat, Database, Message, NewMessage};

use crate::access::AccessControl;
use crate::blocking::BlockingGuard;
use crate::error::{CoreError, OrNotFound, Result};
use crate::retry;

/// What a sender hands over; the file is a reference into blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "message")]
    pub body: Option<String>,
    pub file: Option<FileRef>,
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Text,
            body: Some(body.into()),
            file: None,
        }
    }

    pub fn attachment(kind: MessageType, file: FileRef, caption: Option<String>) -> Self {
        Self {
            kind,
            body: caption,
            file: Some(file),
        }
    }
}

pub struct ConversationAggregator<'a> {
    db: &'a Database,
    access: &'a AccessControl,
    retries: u32,
}

impl<'a> ConversationAggregator<'a> {
    pub fn new(db: &'a Database, access: &'a AccessControl, retries: u32) -> Self {
        Self {
            db,
            access,
            retries,
        }
    }

    /// Send a message from the caller to `receiver`, creating their chat on
    /// first contact. Returns the stored message and the updated chat.
    pub fn send(
        &self,
        auth: &AuthContext,
        receiver: UserId,
        content: MessageContent,
    ) -> Result<(Message, Chat)> {
        let sender = auth
            .user_id
            .ok_or_else(|| CoreError::denied(Collection::Messages, Action::Create))?;
        PairKey::new(sender, receiver)?;
        validate_message_content(content.kind, content.body.as_deref(), content.file.as_ref())?;

        let new = NewMessage {
            sender_id: sender,
            receiver_id: receiver,
            kind: content.kind,
            body: content.body,
            file: content.file,
            created_at: timestamp_now(),
        };
        self.access
            .authorize(Collection::Messages, Action::Create, auth, &new)?;
        self.db
            .get_user(receiver)
            .or_not_found(Collection::Users, receiver)?;

        if BlockingGuard::new(self.db, self.access, self.retries).is_blocked(sender, receiver)? {
            tracing::warn!(%sender, %receiver, "message across a block refused");
            return Err(CoreError::denied(Collection::Messages, Action::Create));
        }

        let (message, chat) = retry::on_busy(self.retries, "send message", || {
            self.db.insert_message(&new, self.retries)
        })?;
        tracing::debug!(
            message = %message.id,
            chat = %chat.id,
            kind = message.kind.as_str(),
            "message stored"
        );
        Ok((message, chat))
    }

    /// Mark one message read. Only its receiver may do this; marking it
    /// again changes nothing.
    pub fn mark_read(&self, auth: &AuthContext, message_id: MessageId) -> Result<Message> {
        let message = self.visible_message(auth, message_id)?;
        self.access
            .authorize(Collection::Messages, Action::Update, auth, &message)?;
        if message.is_read {
            return Ok(message);
        }

        let (message, changed) = retry::on_busy(self.retries, "mark message read", || {
            self.db.mark_message_read(message_id)
        })
        .or_not_found(Collection::Messages, message_id)?;
        if changed {
            tracing::debug!(message = %message_id, chat = %message.chat_id, "message read");
        }
        Ok(message)
    }

    /// Mark everything addressed to the caller in `chat_id` read. Returns how
    /// many messages changed.
    pub fn mark_chat_read(&self, auth: &AuthContext, chat_id: ChatId) -> Result<u32> {
        let chat = self.get_chat(auth, chat_id)?;
        let reader = auth
            .user_id
            .filter(|u| chat.has_participant(*u))
            .ok_or_else(|| CoreError::denied(Collection::Messages, Action::Update))?;
        let filter = self
            .access
            .filter(Collection::Messages, Action::Update, auth)?;

        let changed = retry::on_busy(self.retries, "mark chat read", || {
            self.db.mark_chat_read(chat_id, reader, &filter)
        })
        .or_not_found(Collection::Chats, chat_id)?;
        tracing::debug!(chat = %chat_id, %reader, changed, "chat read");
        Ok(changed)
    }

    /// Delete one of the caller's messages. Reports on it go with it and the
    /// chat summary is brought back in line.
    pub fn delete_message(&self, auth: &AuthContext, message_id: MessageId) -> Result<()> {
        let message = self.visible_message(auth, message_id)?;
        self.access
            .authorize(Collection::Messages, Action::Delete, auth, &message)?;

        let deleted = retry::on_busy(self.retries, "delete message", || {
            self.db.delete_message(message_id)
        })?;
        if !deleted {
            return Err(CoreError::not_found(Collection::Messages, message_id));
        }
        tracing::info!(message = %message_id, chat = %message.chat_id, "message deleted");
        Ok(())
    }

    /// The caller's chats, most recently active first.
    pub fn list_chats(&self, auth: &AuthContext) -> Result<Vec<Chat>> {
        let filter = self.access.filter(Collection::Chats, Action::List, auth)?;
        Ok(self.db.list_chats(&filter)?)
    }

    pub fn get_chat(&self, auth: &AuthContext, chat_id: ChatId) -> Result<Chat> {
        let filter = self.access.filter(Collection::Chats, Action::View, auth)?;
        self.db
            .find_chat(chat_id, &filter)?
            .ok_or_else(|| CoreError::not_found(Collection::Chats, chat_id))
    }

    /// The caller's chat with `other`, if they ever exchanged a message.
    pub fn chat_between(&self, auth: &AuthContext, other: UserId) -> Result<Option<Chat>> {
        let me = auth
            .user_id
            .ok_or_else(|| CoreError::denied(Collection::Chats, Action::View))?;
        let pair = PairKey::new(me, other)?;
        match self.db.chat_for_pair(&pair)? {
            Some(chat) => {
                self.access
                    .authorize(Collection::Chats, Action::View, auth, &chat)?;
                Ok(Some(chat))
            }
            None => Ok(None),
        }
    }

    /// A page of a chat's messages, newest first.
    pub fn list_messages(
        &self,
        auth: &AuthContext,
        chat_id: ChatId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        self.get_chat(auth, chat_id)?;
        let filter = self
            .access
            .filter(Collection::Messages, Action::List, auth)?;
        Ok(self.db.list_messages(chat_id, &filter, limit, offset)?)
    }

    /// Unread messages waiting for the caller in `chat_id`.
    pub fn unread_count(&self, auth: &AuthContext, chat_id: ChatId) -> Result<u32> {
        let chat = self.get_chat(auth, chat_id)?;
        auth.user_id
            .and_then(|me| chat.unread_count_for(me))
            .ok_or_else(|| CoreError::denied(Collection::Chats, Action::View))
    }

    fn visible_message(&self, auth: &AuthContext, message_id: MessageId) -> Result<Message> {
        let filter = self
            .access
            .filter(Collection::Messages, Action::View, auth)?;
        self.db
            .find_message(message_id, &filter)?
            .ok_or_else(|| CoreError::not_found(Collection::Messages, message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{market, user};
    use tutorlink_shared::error::ValidationError;
    use tutorlink_shared::types::Role;

    #[test]
    fn first_message_creates_chat_in_either_direction() {
        let m = market();
        let (a, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);

        let (_, chat) = m
            .conversations()
            .send(&b_auth, a, MessageContent::text("welcome"))
            .unwrap();
        let (_, again) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("thanks"))
            .unwrap();
        assert_eq!(chat.id, again.id);
        assert_eq!(again.last_sender_id, a);
        assert_eq!(m.conversations().list_chats(&a_auth).unwrap().len(), 1);
        assert_eq!(
            m.conversations()
                .chat_between(&a_auth, b)
                .unwrap()
                .map(|c| c.id),
            Some(chat.id)
        );
    }

    #[test]
    fn unread_counts_follow_reads() {
        let m = market();
        let (_, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);

        let mut last = None;
        for i in 0..4 {
            last = Some(
                m.conversations()
                    .send(&a_auth, b, MessageContent::text(format!("m{i}")))
                    .unwrap(),
            );
        }
        let (message, chat) = last.unwrap();
        assert_eq!(m.conversations().unread_count(&b_auth, chat.id).unwrap(), 4);
        assert_eq!(m.conversations().unread_count(&a_auth, chat.id).unwrap(), 0);

        // Only the receiver marks read.
        assert!(matches!(
            m.conversations().mark_read(&a_auth, message.id),
            Err(CoreError::PermissionDenied { .. })
        ));
        m.conversations().mark_read(&b_auth, message.id).unwrap();
        m.conversations().mark_read(&b_auth, message.id).unwrap();
        assert_eq!(m.conversations().unread_count(&b_auth, chat.id).unwrap(), 3);

        assert_eq!(m.conversations().mark_chat_read(&b_auth, chat.id).unwrap(), 3);
        assert_eq!(m.conversations().unread_count(&b_auth, chat.id).unwrap(), 0);
    }

    #[test]
    fn content_is_validated() {
        let m = market();
        let (a, a_auth) = user(&m, Role::Student);
        let (b, _) = user(&m, Role::Tutor);

        assert!(matches!(
            m.conversations().send(&a_auth, a, MessageContent::text("me")),
            Err(CoreError::Validation(ValidationError::SelfReference { .. }))
        ));
        assert!(matches!(
            m.conversations().send(&a_auth, b, MessageContent::text("  ")),
            Err(CoreError::Validation(_))
        ));
        let pdf = FileRef {
            name: "notes.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 100,
        };
        assert!(matches!(
            m.conversations()
                .send(&a_auth, b, MessageContent::attachment(MessageType::Image, pdf, None)),
            Err(CoreError::Validation(_))
        ));

        let photo = FileRef {
            name: "board.png".into(),
            mime_type: "image/png".into(),
            size: 2048,
        };
        let (message, chat) = m
            .conversations()
            .send(&a_auth, b, MessageContent::attachment(MessageType::Image, photo, None))
            .unwrap();
        assert_eq!(message.kind, MessageType::Image);
        assert_eq!(chat.last_message_type, MessageType::Image);
        assert_eq!(chat.last_message, None);
    }

    #[test]
    fn anonymous_and_blocked_senders_are_refused() {
        let m = market();
        let (a, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);

        assert!(matches!(
            m.conversations()
                .send(&AuthContext::anonymous(), b, MessageContent::text("hi")),
            Err(CoreError::PermissionDenied { .. })
        ));

        m.conversations()
            .send(&a_auth, b, MessageContent::text("before"))
            .unwrap();
        m.blocking().block(&b_auth, a).unwrap();
        for (auth, to) in [(&a_auth, b), (&b_auth, a)] {
            assert!(matches!(
                m.conversations().send(auth, to, MessageContent::text("after")),
                Err(CoreError::PermissionDenied { .. })
            ));
        }
        // History survives the block.
        assert_eq!(m.conversations().list_chats(&a_auth).unwrap().len(), 1);
    }

    #[test]
    fn outsiders_see_nothing() {
        let m = market();
        let (_, a_auth) = user(&m, Role::Student);
        let (b, _) = user(&m, Role::Tutor);
        let (_, outsider) = user(&m, Role::Student);

        let (message, chat) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("private"))
            .unwrap();

        assert!(m.conversations().list_chats(&outsider).unwrap().is_empty());
        assert!(matches!(
            m.conversations().get_chat(&outsider, chat.id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.conversations().list_messages(&outsider, chat.id, 10, 0),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.conversations().delete_message(&outsider, message.id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.conversations().get_chat(&AuthContext::anonymous(), chat.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn sender_deletes_and_summary_rolls_back() {
        let m = market();
        let (a, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);

        m.conversations()
            .send(&a_auth, b, MessageContent::text("first"))
            .unwrap();
        let (second, chat) = m
            .conversations()
            .send(&b_auth, a, MessageContent::text("second"))
            .unwrap();

        assert!(matches!(
            m.conversations().delete_message(&a_auth, second.id),
            Err(CoreError::PermissionDenied { .. })
        ));
        m.conversations().delete_message(&b_auth, second.id).unwrap();

        let chat = m.conversations().get_chat(&a_auth, chat.id).unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("first"));
        assert_eq!(chat.unread_count_for(a), Some(0));
        assert_eq!(
            m.conversations()
                .list_messages(&a_auth, chat.id, 10, 0)
                .unwrap()
                .len(),
            1
        );
    }
}
