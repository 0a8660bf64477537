//! Domain model structs persisted in the marketplace database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the request gateway, and implements [`RuleRecord`] so access
//! rules can be evaluated against it.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use tutorlink_shared::rules::{RuleRecord, Value};
use tutorlink_shared::types::{
    BlockId, ChatId, MessageId, MessageType, PairKey, Profile, ReportId, Role, SlotId, UserId,
};
use tutorlink_shared::validation::{format_time_of_day, FileRef};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A marketplace account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub role: Role,
    #[serde(flatten)]
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleRecord for User {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "role" => self.role.as_str().into(),
            "name" => self.profile.name.clone().into(),
            "username" => self.profile.username.clone().into(),
            "city" => self.profile.city.clone().into(),
            "bio" => self.profile.bio.clone().into(),
            "birthDate" => self.profile.birth_date.map(|d| d.to_string()).into(),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Booking state of a slot.
///
/// A student is bound exactly when the slot is not free, and a slot can only
/// be paid once it is booked; both follow from the shape of the enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SlotState {
    Free,
    Booked { student_id: UserId },
    Paid { student_id: UserId },
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Booked { .. } => "booked",
            Self::Paid { .. } => "paid",
        }
    }

    pub fn student_id(&self) -> Option<UserId> {
        match self {
            Self::Free => None,
            Self::Booked { student_id } | Self::Paid { student_id } => Some(*student_id),
        }
    }

    pub fn is_booked(&self) -> bool {
        !matches!(self, Self::Free)
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid { .. })
    }
}

/// A tutor-declared bookable interval on one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: SlotId,
    pub tutor_id: UserId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(flatten)]
    pub state: SlotState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleRecord for Slot {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "tutorId" => self.tutor_id.to_string().into(),
            "studentId" => self.state.student_id().map(|s| s.to_string()).into(),
            "date" => self.date.to_string().into(),
            "startTime" => format_time_of_day(self.start_time).into(),
            "endTime" => format_time_of_day(self.end_time).into(),
            "isBooked" => self.state.is_booked().into(),
            "isPaid" => self.state.is_paid().into(),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Summary of the conversation between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    /// Lower id of the pair.
    pub user1_id: UserId,
    /// Higher id of the pair.
    pub user2_id: UserId,
    pub last_message: Option<String>,
    pub last_message_type: MessageType,
    pub last_sender_id: UserId,
    pub last_timestamp: DateTime<Utc>,
    pub unread_count_user1: u32,
    pub unread_count_user2: u32,
}

impl Chat {
    pub fn pair(&self) -> Option<PairKey> {
        PairKey::new(self.user1_id, self.user2_id).ok()
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.user1_id == user || self.user2_id == user
    }

    /// Unread messages addressed to `user`, `None` if they are not a
    /// participant.
    pub fn unread_count_for(&self, user: UserId) -> Option<u32> {
        if user == self.user1_id {
            Some(self.unread_count_user1)
        } else if user == self.user2_id {
            Some(self.unread_count_user2)
        } else {
            None
        }
    }
}

impl RuleRecord for Chat {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "user1Id" => self.user1_id.to_string().into(),
            "user2Id" => self.user2_id.to_string().into(),
            "lastMessage" => self.last_message.clone().into(),
            "lastMessageType" => self.last_message_type.as_str().into(),
            "lastSenderId" => self.last_sender_id.to_string().into(),
            "unreadCountUser1" => i64::from(self.unread_count_user1).into(),
            "unreadCountUser2" => i64::from(self.unread_count_user2).into(),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single direct message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "message")]
    pub body: Option<String>,
    pub file: Option<FileRef>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl RuleRecord for Message {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "chatId" => self.chat_id.to_string().into(),
            "senderId" => self.sender_id.to_string().into(),
            "receiverId" => self.receiver_id.to_string().into(),
            "message" => self.body.clone().into(),
            "type" => self.kind.as_str().into(),
            "isRead" => self.is_read.into(),
            _ => Value::Null,
        }
    }
}

/// A message about to be written; the store assigns its id and chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub kind: MessageType,
    pub body: Option<String>,
    pub file: Option<FileRef>,
    pub created_at: DateTime<Utc>,
}

impl RuleRecord for NewMessage {
    fn field(&self, name: &str) -> Value {
        match name {
            "senderId" => self.sender_id.to_string().into(),
            "receiverId" => self.receiver_id.to_string().into(),
            "message" => self.body.clone().into(),
            "type" => self.kind.as_str().into(),
            "isRead" => false.into(),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// BlockedUser
// ---------------------------------------------------------------------------

/// `user_id` has blocked `blocked_user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockedUser {
    pub id: BlockId,
    pub user_id: UserId,
    pub blocked_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl RuleRecord for BlockedUser {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "userId" => self.user_id.to_string().into(),
            "blockedUserId" => self.blocked_user_id.to_string().into(),
            _ => Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A moderation report against a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub reported_by: UserId,
    pub message_id: MessageId,
    pub message_owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl RuleRecord for Report {
    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.to_string().into(),
            "reportedBy" => self.reported_by.to_string().into(),
            "messageId" => self.message_id.to_string().into(),
            "messageOwnerId" => self.message_owner_id.to_string().into(),
            _ => Value::Null,
        }
    }
}
