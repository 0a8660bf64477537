use rusqlite::Connection;

// Image and audio messages carry an attachment held by the blob store.
const UP_SQL: &str = r#"
ALTER TABLE messages ADD COLUMN file_name TEXT;
ALTER TABLE messages ADD COLUMN file_mime TEXT;
ALTER TABLE messages ADD COLUMN file_size INTEGER;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
