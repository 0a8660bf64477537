//! # tutorlink-core
//!
//! Marketplace services on top of the store: slot booking, conversations,
//! blocking, moderation and the user directory. Every operation takes the
//! caller's [`AuthContext`](tutorlink_shared::AuthContext) and checks it
//! against the rule catalogue before touching data.

pub mod access;
pub mod blocking;
pub mod booking;
pub mod config;
pub mod conversations;
pub mod error;
pub mod marketplace;
pub mod moderation;
pub mod users;

mod retry;

#[cfg(test)]
mod testing;

pub use access::AccessControl;
pub use blocking::BlockingGuard;
pub use booking::{SlotBookingManager, SlotFilter};
pub use config::CoreConfig;
pub use conversations::{ConversationAggregator, MessageContent};
pub use error::{CoreError, RangeError, Result};
pub use marketplace::{load_rules, Marketplace};
pub use moderation::ModerationLog;
pub use users::{ProfileUpdate, UserDirectory};
