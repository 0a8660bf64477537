//! CRUD operations for [`User`] records.

use rusqlite::{params, params_from_iter, OptionalExtension};

use tutorlink_shared::types::{timestamp_now, Profile, Role, UserId};
use tutorlink_shared::validation::FileRef;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::filter::SqlFilter;
use crate::models::User;
use crate::rows;

const USER_COLUMNS: &str = "users.id, users.role, users.name, users.username, users.birth_date,
     users.city, users.bio, users.avatar_name, users.avatar_mime, users.avatar_size,
     users.created_at, users.updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user.
    pub fn insert_user(&self, user: &User) -> Result<()> {
        let avatar = user.profile.avatar.as_ref();
        self.conn().execute(
            "INSERT INTO users (id, role, name, username, birth_date, city, bio,
                                avatar_name, avatar_mime, avatar_size, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user.id.to_string(),
                user.role.as_str(),
                user.profile.name,
                user.profile.username,
                user.profile.birth_date.map(|d| d.to_string()),
                user.profile.city,
                user.profile.bio,
                avatar.map(|a| a.name.as_str()),
                avatar.map(|a| a.mime_type.as_str()),
                avatar.map(|a| a.size as i64),
                rows::ts(&user.created_at),
                rows::ts(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch a user only if `filter` admits it.
    pub fn find_user(&self, id: UserId, filter: &SqlFilter) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE users.id = ? AND ({})",
            filter.clause
        );
        let mut values = vec![rusqlite::types::Value::Text(id.to_string())];
        values.extend(filter.params.iter().cloned());
        let user = self
            .conn()
            .query_row(&sql, params_from_iter(values), row_to_user)
            .optional()?;
        Ok(user)
    }

    /// List users admitted by `filter`, ordered by creation date.
    pub fn list_users(&self, filter: &SqlFilter) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY users.created_at ASC",
            filter.clause
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.params.iter()), row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Whether the user owns or has booked any slot.
    pub fn user_has_slots(&self, id: UserId) -> Result<bool> {
        let found: bool = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM slots WHERE tutor_id = ?1 OR student_id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite role and profile. Returns `true` if the user existed.
    pub fn update_user(&self, id: UserId, role: Role, profile: &Profile) -> Result<bool> {
        let avatar = profile.avatar.as_ref();
        let affected = self.conn().execute(
            "UPDATE users
             SET role = ?2, name = ?3, username = ?4, birth_date = ?5, city = ?6, bio = ?7,
                 avatar_name = ?8, avatar_mime = ?9, avatar_size = ?10, updated_at = ?11
             WHERE id = ?1",
            params![
                id.to_string(),
                role.as_str(),
                profile.name,
                profile.username,
                profile.birth_date.map(|d| d.to_string()),
                profile.city,
                profile.bio,
                avatar.map(|a| a.name.as_str()),
                avatar.map(|a| a.mime_type.as_str()),
                avatar.map(|a| a.size as i64),
                rows::ts(&timestamp_now()),
            ],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a user and everything that depends on them.
    ///
    /// Slots the user booked with other tutors go back to free first; the
    /// rest (owned slots, chats and their messages, blocks, reports) follows
    /// the table cascades. Returns `true` if a row was deleted.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let id = id.to_string();
        self.immediate(|tx| {
            let released = tx.execute(
                "UPDATE slots SET state = 'free', student_id = NULL, updated_at = ?2
                 WHERE student_id = ?1 AND tutor_id <> ?1",
                params![id, rows::ts(&timestamp_now())],
            )?;
            let affected = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
            if affected > 0 {
                tracing::info!(user = %id, released_slots = released, "user deleted");
            }
            Ok(affected > 0)
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let avatar_name: Option<String> = row.get(7)?;
    let avatar_mime: Option<String> = row.get(8)?;
    let avatar_size: Option<i64> = row.get(9)?;

    let avatar = match (avatar_name, avatar_mime) {
        (Some(name), Some(mime_type)) => Some(FileRef {
            name,
            mime_type,
            size: avatar_size.unwrap_or(0).max(0) as u64,
        }),
        _ => None,
    };

    Ok(User {
        id: rows::id(row, 0)?,
        role: rows::enumeration(row, 1, Role::parse)?,
        profile: Profile {
            name: row.get(2)?,
            username: row.get(3)?,
            birth_date: rows::opt_date(row, 4)?,
            city: row.get(5)?,
            bio: row.get(6)?,
            avatar,
        },
        created_at: rows::timestamp(row, 10)?,
        updated_at: rows::timestamp(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Slot, SlotState};
    use crate::testing::{sample_user, slot_on};
    use chrono::NaiveDate;

    #[test]
    fn insert_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let mut user = sample_user(Role::Tutor);
        user.profile.bio = Some("Maths and physics".into());
        user.profile.avatar = Some(FileRef {
            name: "me.png".into(),
            mime_type: "image/png".into(),
            size: 2048,
        });
        db.insert_user(&user).unwrap();

        let loaded = db.get_user(user.id).unwrap();
        assert_eq!(loaded, user);
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId::new()), Err(StoreError::NotFound)));
    }

    #[test]
    fn update_changes_profile() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(Role::Student);
        db.insert_user(&user).unwrap();

        let profile = Profile {
            city: Some("Kazan".into()),
            ..Default::default()
        };
        assert!(db.update_user(user.id, Role::Student, &profile).unwrap());
        assert_eq!(db.get_user(user.id).unwrap().profile.city.as_deref(), Some("Kazan"));
        assert!(!db.update_user(UserId::new(), Role::Student, &profile).unwrap());
    }

    #[test]
    fn delete_releases_booked_slots() {
        let db = Database::open_in_memory().unwrap();
        let tutor = sample_user(Role::Tutor);
        let student = sample_user(Role::Student);
        db.insert_user(&tutor).unwrap();
        db.insert_user(&student).unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 1, 7).unwrap();
        let slot: Slot = slot_on(tutor.id, date, "10:00", "11:00");
        db.insert_slot(&slot).unwrap();
        db.book_slot(slot.id, student.id).unwrap();
        assert!(db.user_has_slots(student.id).unwrap());

        assert!(db.delete_user(student.id).unwrap());
        assert_eq!(db.get_slot(slot.id).unwrap().state, SlotState::Free);

        assert!(db.delete_user(tutor.id).unwrap());
        assert!(matches!(db.get_slot(slot.id), Err(StoreError::NotFound)));
        assert!(!db.delete_user(tutor.id).unwrap());
    }
}
