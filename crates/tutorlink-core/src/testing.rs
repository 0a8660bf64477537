use std::path::Path;

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::types::{Profile, Role, UserId};
use tutorlink_store::Database;

use crate::config::CoreConfig;
use crate::marketplace::Marketplace;

pub(crate) fn market() -> Marketplace {
    Marketplace::open_in_memory(CoreConfig::default()).unwrap()
}

/// A file-backed marketplace that gives up on a locked database at once
/// and retries twice.
pub(crate) fn impatient_market(path: &Path) -> Marketplace {
    Marketplace::open(CoreConfig {
        database_path: Some(path.to_path_buf()),
        max_conflict_retries: 2,
        busy_timeout_ms: 0,
        ..Default::default()
    })
    .unwrap()
}

/// Open a second connection to `path` and hold its write lock until the
/// returned handle runs `COMMIT` or is dropped.
pub(crate) fn hold_write_lock(path: &Path) -> Database {
    let db = Database::open_at(path).unwrap();
    db.conn().execute_batch("BEGIN IMMEDIATE").unwrap();
    db
}

/// Register a user without a username and return a session for them.
pub(crate) fn user(m: &Marketplace, role: Role) -> (UserId, AuthContext) {
    let user = m
        .users()
        .register(&AuthContext::anonymous(), role, Profile::default())
        .unwrap();
    (user.id, AuthContext::user(user.id, role))
}
