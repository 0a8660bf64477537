/// Application name
pub const APP_NAME: &str = "Tutorlink";

/// Maximum length of a user's display name (characters)
pub const MAX_NAME_CHARS: usize = 100;

/// Username length bounds (characters)
pub const MIN_USERNAME_CHARS: usize = 3;
pub const MAX_USERNAME_CHARS: usize = 50;

/// Maximum length of a user's city (characters)
pub const MAX_CITY_CHARS: usize = 100;

/// Maximum length of a user's bio (characters)
pub const MAX_BIO_CHARS: usize = 500;

/// Maximum avatar size in bytes (5 MiB)
pub const MAX_AVATAR_BYTES: u64 = 5 * 1024 * 1024;

/// Accepted avatar mimetypes
pub const AVATAR_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Maximum length of a text message body (characters)
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// Maximum length of the last-message snippet kept on a chat (characters)
pub const MAX_SNIPPET_CHARS: usize = 500;

/// Maximum message attachment size in bytes (10 MiB)
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted message attachment mimetypes
pub const ATTACHMENT_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "video/mpeg",
    "audio/mp4",
    "audio/aac",
    "audio/x-m4a",
    "audio/wav",
    "audio/ogg",
];

/// Retries for contended writes before a `Conflict` is surfaced
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
