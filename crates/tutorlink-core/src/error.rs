use std::path::PathBuf;

use thiserror::Error;

use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::error::{RuleError, ValidationError};
use tutorlink_shared::types::SlotId;
use tutorlink_store::StoreError;

/// Errors surfaced by the marketplace services.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The access rule for this action evaluated to false.
    #[error("Permission denied: {action} on {collection}")]
    PermissionDenied {
        collection: Collection,
        action: Action,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Lost a race, hit an invalid state transition or a duplicate.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record does not exist or the caller may not see it.
    #[error("{collection} record {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("Invalid time range: {0}")]
    InvalidRange(RangeError),

    #[error("Rule catalogue error: {0}")]
    Rules(#[from] RuleError),

    #[error("Could not read rule catalogue {path}: {source}")]
    RulesFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Why a slot's interval was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("start {start} is not before end {end}")]
    StartNotBeforeEnd { start: String, end: String },

    #[error("overlaps slot {existing} ({start}-{end})")]
    Overlap {
        existing: SlotId,
        start: String,
        end: String,
    },
}

impl CoreError {
    pub(crate) fn denied(collection: Collection, action: Action) -> Self {
        Self::PermissionDenied { collection, action }
    }

    pub(crate) fn not_found(collection: Collection, id: impl ToString) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Validation(v) => Self::Validation(v),
            other => Self::Store(other),
        }
    }
}

/// Attach the record a bare [`StoreError::NotFound`] was about.
pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, collection: Collection, id: impl ToString) -> Result<T>;
}

impl<T> OrNotFound<T> for std::result::Result<T, StoreError> {
    fn or_not_found(self, collection: Collection, id: impl ToString) -> Result<T> {
        self.map_err(|e| match e {
            StoreError::NotFound => CoreError::not_found(collection, id),
            other => other.into(),
        })
    }
}

impl<T> OrNotFound<T> for Result<T> {
    fn or_not_found(self, collection: Collection, id: impl ToString) -> Result<T> {
        self.map_err(|e| match e {
            CoreError::Store(StoreError::NotFound) => CoreError::not_found(collection, id),
            other => other,
        })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_keep_their_meaning() {
        let err: CoreError = StoreError::Conflict("pair busy".into()).into();
        assert!(matches!(err, CoreError::Conflict(ref m) if m == "pair busy"));

        let err: CoreError =
            StoreError::Validation(ValidationError::SelfReference { field: "receiverId" }).into();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn missing_rows_name_their_collection() {
        let res: std::result::Result<(), StoreError> = Err(StoreError::NotFound);
        let err = res.or_not_found(Collection::Slots, "abc").unwrap_err();
        assert_eq!(err.to_string(), "slots record abc not found");
    }
}
