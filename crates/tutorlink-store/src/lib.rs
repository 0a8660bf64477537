//! # tutorlink-store
//!
//! SQLite storage for the tutoring marketplace.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! model, plus the compound writes that must be atomic: slot state
//! transitions, message insert with chat summary upkeep, and user deletion
//! with its cascades. List queries take a [`SqlFilter`] compiled from the
//! caller's access rule.

pub mod blocks;
pub mod chats;
pub mod database;
pub mod filter;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reports;
pub mod slots;
pub mod users;

mod error;
mod rows;

#[cfg(test)]
mod testing;

pub use database::Database;
pub use error::StoreError;
pub use filter::SqlFilter;
pub use models::*;
pub use slots::{SlotInsert, SlotQuery, Transition};
pub use rusqlite;
