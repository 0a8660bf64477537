//! Account records: registration, profile edits and deletion.

use serde::{Deserialize, Serialize};

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::types::{timestamp_now, Profile, Role, UserId};
use tutorlink_shared::validation::validate_profile;
use tutorlink_store::{Database, StoreError, User};

use crate::access::AccessControl;
use crate::error::{CoreError, OrNotFound, Result};
use crate::retry;

/// Changes to an existing account. Every field left `None`, the role
/// included, keeps its current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub role: Option<Role>,
    #[serde(flatten)]
    pub profile: Profile,
}

impl ProfileUpdate {
    fn apply_to(self, current: &Profile) -> Profile {
        let patch = self.profile;
        Profile {
            name: patch.name.or_else(|| current.name.clone()),
            username: patch.username.or_else(|| current.username.clone()),
            birth_date: patch.birth_date.or(current.birth_date),
            city: patch.city.or_else(|| current.city.clone()),
            bio: patch.bio.or_else(|| current.bio.clone()),
            avatar: patch.avatar.or_else(|| current.avatar.clone()),
        }
    }
}

pub struct UserDirectory<'a> {
    db: &'a Database,
    access: &'a AccessControl,
    retries: u32,
}

impl<'a> UserDirectory<'a> {
    pub fn new(db: &'a Database, access: &'a AccessControl, retries: u32) -> Self {
        Self {
            db,
            access,
            retries,
        }
    }

    /// Create an account. Credentials live with the identity provider; this
    /// only records the marketplace side.
    pub fn register(&self, auth: &AuthContext, role: Role, profile: Profile) -> Result<User> {
        validate_profile(&profile)?;
        let now = timestamp_now();
        let user = User {
            id: UserId::new(),
            role,
            profile,
            created_at: now,
            updated_at: now,
        };
        self.access
            .authorize(Collection::Users, Action::Create, auth, &user)?;

        retry::on_busy(self.retries, "register user", || self.db.insert_user(&user))
            .map_err(username_taken)?;
        tracing::info!(user = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub fn get(&self, auth: &AuthContext, id: UserId) -> Result<User> {
        let filter = self.access.filter(Collection::Users, Action::View, auth)?;
        self.db
            .find_user(id, &filter)?
            .ok_or_else(|| CoreError::not_found(Collection::Users, id))
    }

    pub fn list(&self, auth: &AuthContext) -> Result<Vec<User>> {
        let filter = self.access.filter(Collection::Users, Action::List, auth)?;
        Ok(self.db.list_users(&filter)?)
    }

    pub fn update_profile(
        &self,
        auth: &AuthContext,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<User> {
        let current = self.db.get_user(id).or_not_found(Collection::Users, id)?;
        self.access
            .authorize(Collection::Users, Action::Update, auth, &current)?;

        let role = update.role.unwrap_or(current.role);
        let profile = update.apply_to(&current.profile);
        validate_profile(&profile)?;

        if role != current.role && self.db.user_has_slots(id)? {
            tracing::warn!(
                user = %id,
                from = %current.role,
                to = %role,
                "role changed on a user with slots"
            );
        }

        let updated = retry::on_busy(self.retries, "update user", || {
            self.db.update_user(id, role, &profile)
        })
        .map_err(username_taken)?;
        if !updated {
            return Err(CoreError::not_found(Collection::Users, id));
        }
        self.db.get_user(id).or_not_found(Collection::Users, id)
    }

    /// Delete an account and everything hanging off it. Slots the user had
    /// booked with other tutors become free again.
    pub fn delete(&self, auth: &AuthContext, id: UserId) -> Result<()> {
        let current = self.db.get_user(id).or_not_found(Collection::Users, id)?;
        self.access
            .authorize(Collection::Users, Action::Delete, auth, &current)?;

        if !retry::on_busy(self.retries, "delete user", || self.db.delete_user(id))? {
            return Err(CoreError::not_found(Collection::Users, id));
        }
        Ok(())
    }
}

fn username_taken(err: CoreError) -> CoreError {
    match err {
        CoreError::Store(e @ StoreError::Sqlite(_)) if e.is_unique_violation() => {
            CoreError::Conflict("username is already taken".into())
        }
        other => other,
    }
}
