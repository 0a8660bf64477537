use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::validation::FileRef;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

/// The current time at the microsecond precision the store keeps, so a
/// record stamped with it reads back unchanged.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

record_id!(
    /// Identity of a marketplace account (student or tutor).
    UserId
);
record_id!(SlotId);
record_id!(ChatId);
record_id!(MessageId);
record_id!(BlockId);
record_id!(ReportId);

/// Marketplace role of an account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Tutor => "tutor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "tutor" => Some(Self::Tutor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payload a chat message carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which column of a two-party record a user occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSide {
    First,
    Second,
}

/// Order-independent key for two distinct users.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)`; the lower id always lands in
/// `first`, so a lookup in either direction resolves to the same chat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    first: UserId,
    second: UserId,
}

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Result<Self, ValidationError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { first: a, second: b }),
            std::cmp::Ordering::Greater => Ok(Self { first: b, second: a }),
            std::cmp::Ordering::Equal => Err(ValidationError::SelfReference {
                field: "receiverId",
            }),
        }
    }

    pub fn first(&self) -> UserId {
        self.first
    }

    pub fn second(&self) -> UserId {
        self.second
    }

    pub fn side_of(&self, user: UserId) -> Option<PairSide> {
        if user == self.first {
            Some(PairSide::First)
        } else if user == self.second {
            Some(PairSide::Second)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.first, self.second)
    }
}

/// Editable profile fields of a user account.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: Option<String>,
    pub username: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub city: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<FileRef>,
}
