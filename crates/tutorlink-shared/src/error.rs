use thiserror::Error;

use crate::collections::Action;

/// Errors raised while loading the rule catalogue.
///
/// These are configuration errors: they surface once at load time and a
/// catalogue that produced one is never used to evaluate requests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("{collection}.{action}Rule: {source}")]
    Invalid {
        collection: &'static str,
        action: Action,
        source: ExprError,
    },

    #[error("Unknown collection in rule catalogue: {0}")]
    UnknownCollection(String),

    #[error("Rule catalogue is not valid JSON: {0}")]
    Json(String),
}

/// Errors produced while parsing a single rule expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unknown macro `{0}`")]
    UnknownMacro(String),

    #[error("cannot compare {left} with {right}")]
    TypeMismatch {
        left: &'static str,
        right: &'static str,
    },
}

/// A field value that violates its collection constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must not be set for this message type")]
    Unexpected { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("{field} does not match {expected}")]
    Pattern {
        field: &'static str,
        expected: &'static str,
    },

    #[error("{field}: mimetype {mime} is not accepted")]
    MimeType { field: &'static str, mime: String },

    #[error("{field}: {size} bytes exceeds the {max} byte limit")]
    FileTooLarge {
        field: &'static str,
        size: u64,
        max: u64,
    },

    #[error("{field} must reference another user")]
    SelfReference { field: &'static str },
}
