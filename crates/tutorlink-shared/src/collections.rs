//! Collection and field catalogue.
//!
//! Rule expressions may only reference fields listed here; the parser
//! resolves every field reference against this table at load time and the
//! store maps the same names onto SQL columns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar kind of a record field as seen by the rule language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Bool,
    Number,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Number => "number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn text(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Text,
    }
}

const fn boolean(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Bool,
    }
}

const fn number(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Number,
    }
}

const USER_FIELDS: &[FieldDef] = &[
    text("id"),
    text("role"),
    text("name"),
    text("username"),
    text("city"),
    text("bio"),
    text("birthDate"),
];

const SLOT_FIELDS: &[FieldDef] = &[
    text("id"),
    text("tutorId"),
    text("studentId"),
    text("date"),
    text("startTime"),
    text("endTime"),
    boolean("isBooked"),
    boolean("isPaid"),
];

const CHAT_FIELDS: &[FieldDef] = &[
    text("id"),
    text("user1Id"),
    text("user2Id"),
    text("lastMessage"),
    text("lastMessageType"),
    text("lastSenderId"),
    number("unreadCountUser1"),
    number("unreadCountUser2"),
];

const MESSAGE_FIELDS: &[FieldDef] = &[
    text("id"),
    text("chatId"),
    text("senderId"),
    text("receiverId"),
    text("message"),
    text("type"),
    boolean("isRead"),
];

const BLOCK_FIELDS: &[FieldDef] = &[text("id"), text("userId"), text("blockedUserId")];

const REPORT_FIELDS: &[FieldDef] = &[
    text("id"),
    text("reportedBy"),
    text("messageId"),
    text("messageOwnerId"),
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Slots,
    Chats,
    Messages,
    BlockedUsers,
    Reports,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Self::Users,
        Self::Slots,
        Self::Chats,
        Self::Messages,
        Self::BlockedUsers,
        Self::Reports,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Slots => "slots",
            Self::Chats => "chats",
            Self::Messages => "messages",
            Self::BlockedUsers => "blocked_users",
            Self::Reports => "reports",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn fields(&self) -> &'static [FieldDef] {
        match self {
            Self::Users => USER_FIELDS,
            Self::Slots => SLOT_FIELDS,
            Self::Chats => CHAT_FIELDS,
            Self::Messages => MESSAGE_FIELDS,
            Self::BlockedUsers => BLOCK_FIELDS,
            Self::Reports => REPORT_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldDef> {
        self.fields().iter().copied().find(|f| f.name == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five operations every collection carries a rule for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    List,
    View,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Self::List,
        Self::View,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
