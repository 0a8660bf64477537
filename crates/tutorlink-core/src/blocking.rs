//! Block relationships between users.
//!
//! A block is directional as a record but symmetric in effect: once either
//! user blocks the other, no messages flow between them, neither can book the
//! other's slots and the blocked tutor's slots drop out of listings. Earlier
//! history is left alone.

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::error::ValidationError;
use tutorlink_shared::types::{timestamp_now, BlockId, UserId};
use tutorlink_store::{BlockedUser, Database};

use crate::access::AccessControl;
use crate::error::{CoreError, OrNotFound, Result};
use crate::retry;

pub struct BlockingGuard<'a> {
    db: &'a Database,
    access: &'a AccessControl,
    retries: u32,
}

impl<'a> BlockingGuard<'a> {
    pub fn new(db: &'a Database, access: &'a AccessControl, retries: u32) -> Self {
        Self {
            db,
            access,
            retries,
        }
    }

    /// True if a block exists in either direction.
    pub fn is_blocked(&self, a: UserId, b: UserId) -> Result<bool> {
        Ok(self.db.is_blocked_either(a, b)?)
    }

    /// Block `target` on behalf of the caller.
    pub fn block(&self, auth: &AuthContext, target: UserId) -> Result<BlockedUser> {
        let me = auth
            .user_id
            .ok_or_else(|| CoreError::denied(Collection::BlockedUsers, Action::Create))?;
        if me == target {
            return Err(ValidationError::SelfReference {
                field: "blockedUserId",
            }
            .into());
        }

        let candidate = BlockedUser {
            id: BlockId::new(),
            user_id: me,
            blocked_user_id: target,
            created_at: timestamp_now(),
        };
        self.access
            .authorize(Collection::BlockedUsers, Action::Create, auth, &candidate)?;
        self.db
            .get_user(target)
            .or_not_found(Collection::Users, target)?;

        match retry::on_busy(self.retries, "block user", || self.db.insert_block(me, target)) {
            Ok(record) => {
                tracing::info!(user = %me, blocked = %target, "user blocked");
                Ok(record)
            }
            Err(CoreError::Store(e)) if e.is_unique_violation() => {
                Err(CoreError::Conflict(format!("{target} is already blocked")))
            }
            Err(e) => Err(e),
        }
    }

    /// Lift the caller's block on `target`.
    pub fn unblock(&self, auth: &AuthContext, target: UserId) -> Result<()> {
        let me = auth
            .user_id
            .ok_or_else(|| CoreError::denied(Collection::BlockedUsers, Action::Delete))?;
        let record = self
            .db
            .find_block(me, target)?
            .ok_or_else(|| CoreError::not_found(Collection::BlockedUsers, target))?;
        self.access
            .authorize(Collection::BlockedUsers, Action::Delete, auth, &record)?;

        retry::on_busy(self.retries, "unblock user", || self.db.delete_block(record.id))
            .or_not_found(Collection::BlockedUsers, record.id)?;
        tracing::info!(user = %me, unblocked = %target, "user unblocked");
        Ok(())
    }

    /// Block records visible to the caller.
    pub fn list(&self, auth: &AuthContext) -> Result<Vec<BlockedUser>> {
        let filter = self
            .access
            .filter(Collection::BlockedUsers, Action::List, auth)?;
        Ok(self.db.list_blocks(&filter)?)
    }
}
