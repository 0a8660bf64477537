//! Field-level constraints shared by every collection.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ValidationError;
use crate::types::{MessageType, Profile};

/// Metadata of a file held by the external blob store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

pub fn check_max_chars(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Parse a strict `HH:MM` wall-clock time (24h, zero padded).
pub fn parse_time_of_day(field: &'static str, value: &str) -> Result<NaiveTime, ValidationError> {
    let bad = || ValidationError::Pattern {
        field,
        expected: "HH:MM",
    };
    if value.len() != 5 || value.as_bytes()[2] != b':' {
        return Err(bad());
    }
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| bad())
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn check_file(
    field: &'static str,
    file: &FileRef,
    accepted: &[&str],
    max: u64,
) -> Result<(), ValidationError> {
    if !accepted.contains(&file.mime_type.as_str()) {
        return Err(ValidationError::MimeType {
            field,
            mime: file.mime_type.clone(),
        });
    }
    if file.size > max {
        return Err(ValidationError::FileTooLarge {
            field,
            size: file.size,
            max,
        });
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if len < MIN_USERNAME_CHARS {
        return Err(ValidationError::TooShort {
            field: "username",
            min: MIN_USERNAME_CHARS,
        });
    }
    if len > MAX_USERNAME_CHARS {
        return Err(ValidationError::TooLong {
            field: "username",
            max: MAX_USERNAME_CHARS,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::Pattern {
            field: "username",
            expected: "[A-Za-z0-9_]",
        });
    }
    Ok(())
}

pub fn validate_profile(profile: &Profile) -> Result<(), ValidationError> {
    if let Some(name) = &profile.name {
        check_max_chars("name", name, MAX_NAME_CHARS)?;
    }
    if let Some(username) = &profile.username {
        validate_username(username)?;
    }
    if let Some(city) = &profile.city {
        check_max_chars("city", city, MAX_CITY_CHARS)?;
    }
    if let Some(bio) = &profile.bio {
        check_max_chars("bio", bio, MAX_BIO_CHARS)?;
    }
    if let Some(avatar) = &profile.avatar {
        check_file("avatar", avatar, AVATAR_MIME_TYPES, MAX_AVATAR_BYTES)?;
    }
    Ok(())
}

/// Check that a message body and attachment agree with its type.
///
/// Text messages need a non-empty body and carry no file. Image and audio
/// messages need a file of the matching family; a caption is optional.
pub fn validate_message_content(
    kind: MessageType,
    body: Option<&str>,
    file: Option<&FileRef>,
) -> Result<(), ValidationError> {
    if let Some(body) = body {
        check_max_chars("message", body, MAX_MESSAGE_CHARS)?;
    }

    match kind {
        MessageType::Text => {
            if body.map_or(true, |b| b.trim().is_empty()) {
                return Err(ValidationError::Missing { field: "message" });
            }
            if file.is_some() {
                return Err(ValidationError::Unexpected { field: "file" });
            }
        }
        MessageType::Image | MessageType::Audio => {
            let file = file.ok_or(ValidationError::Missing { field: "file" })?;
            check_file("file", file, ATTACHMENT_MIME_TYPES, MAX_ATTACHMENT_BYTES)?;
            let family_ok = match kind {
                MessageType::Image => file.mime_type.starts_with("image/"),
                _ => file.mime_type.starts_with("audio/") || file.mime_type == "video/mpeg",
            };
            if !family_ok {
                return Err(ValidationError::MimeType {
                    field: "file",
                    mime: file.mime_type.clone(),
                });
            }
        }
    }
    Ok(())
}

/// The text stored as a chat's last-message snippet.
pub fn summary_snippet(body: Option<&str>) -> Option<String> {
    body.map(|b| b.chars().take(MAX_SNIPPET_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, size: u64) -> FileRef {
        FileRef {
            name: "f".into(),
            mime_type: mime.into(),
            size,
        }
    }

    #[test]
    fn time_of_day_accepts_padded_times() {
        assert!(parse_time_of_day("startTime", "09:00").is_ok());
        assert!(parse_time_of_day("startTime", "23:59").is_ok());
    }

    #[test]
    fn time_of_day_rejects_bad_shapes() {
        for bad in ["9:00", "24:00", "12:60", "12-30", "", "12:300"] {
            assert!(parse_time_of_day("startTime", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn bio_length_is_bounded() {
        let profile = Profile {
            bio: Some("x".repeat(501)),
            ..Default::default()
        };
        assert_eq!(
            validate_profile(&profile),
            Err(ValidationError::TooLong {
                field: "bio",
                max: 500
            })
        );
    }

    #[test]
    fn avatar_must_be_small_image() {
        let mut profile = Profile {
            avatar: Some(file("image/png", 1024)),
            ..Default::default()
        };
        assert!(validate_profile(&profile).is_ok());

        profile.avatar = Some(file("application/pdf", 1024));
        assert!(matches!(
            validate_profile(&profile),
            Err(ValidationError::MimeType { .. })
        ));

        profile.avatar = Some(file("image/png", MAX_AVATAR_BYTES + 1));
        assert!(matches!(
            validate_profile(&profile),
            Err(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn username_pattern() {
        assert!(validate_username("anna_92").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("anna k").is_err());
    }

    #[test]
    fn text_message_needs_body() {
        assert!(validate_message_content(MessageType::Text, Some("hi"), None).is_ok());
        assert_eq!(
            validate_message_content(MessageType::Text, None, None),
            Err(ValidationError::Missing { field: "message" })
        );
        assert_eq!(
            validate_message_content(MessageType::Text, Some("hi"), Some(&file("image/png", 1))),
            Err(ValidationError::Unexpected { field: "file" })
        );
    }

    #[test]
    fn media_message_needs_matching_file() {
        let image = file("image/jpeg", 2048);
        let audio = file("audio/ogg", 2048);
        assert!(validate_message_content(MessageType::Image, None, Some(&image)).is_ok());
        assert!(validate_message_content(MessageType::Audio, Some("listen"), Some(&audio)).is_ok());
        assert!(validate_message_content(MessageType::Image, None, Some(&audio)).is_err());
        assert!(validate_message_content(MessageType::Audio, None, None).is_err());
    }

    #[test]
    fn snippet_is_truncated() {
        let long = "é".repeat(MAX_SNIPPET_CHARS + 20);
        let snippet = summary_snippet(Some(&long)).unwrap();
        assert_eq!(snippet.chars().count(), MAX_SNIPPET_CHARS);
        assert_eq!(summary_snippet(None), None);
    }
}
