//! # tutorlink-shared
//!
//! Domain types, constants, field validation and the access-rule language
//! shared by the store and the core services. Nothing in this crate touches
//! storage or performs I/O.

pub mod auth;
pub mod collections;
pub mod constants;
pub mod error;
pub mod rules;
pub mod types;
pub mod validation;

pub use auth::AuthContext;
pub use collections::{Action, Collection, FieldKind};
pub use error::{ExprError, RuleError, ValidationError};
pub use rules::{Rule, RuleRecord, RuleSet, Value};
pub use types::*;
pub use validation::FileRef;
