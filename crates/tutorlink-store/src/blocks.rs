//! Directional block records.

use rusqlite::{params, params_from_iter, OptionalExtension};

use tutorlink_shared::types::{timestamp_now, BlockId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::filter::SqlFilter;
use crate::models::BlockedUser;
use crate::rows;

const BLOCK_COLUMNS: &str = "blocked_users.id, blocked_users.user_id,
     blocked_users.blocked_user_id, blocked_users.created_at";

impl Database {
    /// Record that `user` blocks `blocked`.
    ///
    /// A second block in the same direction violates the pair index; callers
    /// can tell with [`StoreError::is_unique_violation`].
    pub fn insert_block(&self, user: UserId, blocked: UserId) -> Result<BlockedUser> {
        let record = BlockedUser {
            id: BlockId::new(),
            user_id: user,
            blocked_user_id: blocked,
            created_at: timestamp_now(),
        };
        self.conn().execute(
            "INSERT INTO blocked_users (id, user_id, blocked_user_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_string(),
                record.user_id.to_string(),
                record.blocked_user_id.to_string(),
                rows::ts(&record.created_at),
            ],
        )?;
        Ok(record)
    }

    /// The block `user -> blocked`, if any.
    pub fn find_block(&self, user: UserId, blocked: UserId) -> Result<Option<BlockedUser>> {
        let record = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocked_users
                     WHERE user_id = ?1 AND blocked_user_id = ?2"
                ),
                params![user.to_string(), blocked.to_string()],
                row_to_block,
            )
            .optional()?;
        Ok(record)
    }

    /// True if either user blocks the other.
    pub fn is_blocked_either(&self, a: UserId, b: UserId) -> Result<bool> {
        let found: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM blocked_users
                           WHERE (user_id = ?1 AND blocked_user_id = ?2)
                              OR (user_id = ?2 AND blocked_user_id = ?1))",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Block records admitted by `filter`, newest first.
    pub fn list_blocks(&self, filter: &SqlFilter) -> Result<Vec<BlockedUser>> {
        let sql = format!(
            "SELECT {BLOCK_COLUMNS} FROM blocked_users WHERE {}
             ORDER BY blocked_users.created_at DESC",
            filter.clause
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.params.iter()), row_to_block)?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    pub fn delete_block(&self, id: BlockId) -> Result<()> {
        let affected = self.conn().execute(
            "DELETE FROM blocked_users WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockedUser> {
    Ok(BlockedUser {
        id: rows::id(row, 0)?,
        user_id: rows::id(row, 1)?,
        blocked_user_id: rows::id(row, 2)?,
        created_at: rows::timestamp(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_user;
    use tutorlink_shared::types::Role;

    #[test]
    fn block_is_checked_in_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let a = sample_user(Role::Student);
        let b = sample_user(Role::Tutor);
        db.insert_user(&a).unwrap();
        db.insert_user(&b).unwrap();

        assert!(!db.is_blocked_either(a.id, b.id).unwrap());
        let block = db.insert_block(a.id, b.id).unwrap();
        assert!(db.is_blocked_either(a.id, b.id).unwrap());
        assert!(db.is_blocked_either(b.id, a.id).unwrap());
        assert_eq!(db.find_block(a.id, b.id).unwrap(), Some(block.clone()));
        assert_eq!(db.find_block(b.id, a.id).unwrap(), None);

        db.delete_block(block.id).unwrap();
        assert!(!db.is_blocked_either(a.id, b.id).unwrap());
        assert!(matches!(db.delete_block(block.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn duplicate_and_self_blocks_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = sample_user(Role::Student);
        let b = sample_user(Role::Tutor);
        db.insert_user(&a).unwrap();
        db.insert_user(&b).unwrap();

        db.insert_block(a.id, b.id).unwrap();
        assert!(db.insert_block(a.id, b.id).unwrap_err().is_unique_violation());
        // The reverse direction is a separate record.
        db.insert_block(b.id, a.id).unwrap();

        assert!(db.insert_block(a.id, a.id).unwrap_err().is_constraint_violation());
        assert_eq!(db.list_blocks(&SqlFilter::allow_all()).unwrap().len(), 2);
    }
}
