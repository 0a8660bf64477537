use rusqlite::Connection;

const UP_SQL: &str = r#"
-- One block record per direction, one report per reporter and message
CREATE UNIQUE INDEX IF NOT EXISTS idx_blocked_users_pair
    ON blocked_users(user_id, blocked_user_id);
CREATE INDEX IF NOT EXISTS idx_blocked_users_blocked
    ON blocked_users(blocked_user_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_reporter_message
    ON reports(reported_by, message_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
