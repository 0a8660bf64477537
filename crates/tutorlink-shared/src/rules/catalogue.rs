//! Built-in rule catalogue.

use std::collections::HashMap;

use super::RawCollectionRules;

const AUTHENTICATED: &str = "@request.auth.id != \"\"";
const SLOT_VISIBLE: &str =
    "tutorId = @request.auth.id || studentId = @request.auth.id || isBooked = false";
const CHAT_PARTICIPANT: &str = "user1Id = @request.auth.id || user2Id = @request.auth.id";
const MESSAGE_PARTICIPANT: &str = "senderId = @request.auth.id || receiverId = @request.auth.id";
const BLOCKER: &str = "userId = @request.auth.id";

fn rules(
    list: Option<&str>,
    view: Option<&str>,
    create: Option<&str>,
    update: Option<&str>,
    delete: Option<&str>,
) -> RawCollectionRules {
    RawCollectionRules {
        list_rule: list.map(str::to_string),
        view_rule: view.map(str::to_string),
        create_rule: create.map(str::to_string),
        update_rule: update.map(str::to_string),
        delete_rule: delete.map(str::to_string),
    }
}

pub fn default_catalogue() -> HashMap<String, RawCollectionRules> {
    let mut catalogue = HashMap::new();

    catalogue.insert(
        "users".to_string(),
        rules(
            Some(AUTHENTICATED),
            Some(AUTHENTICATED),
            Some(""),
            Some("id = @request.auth.id"),
            Some("id = @request.auth.id"),
        ),
    );

    catalogue.insert(
        "slots".to_string(),
        rules(
            Some(SLOT_VISIBLE),
            Some(SLOT_VISIBLE),
            Some("tutorId = @request.auth.id && @request.auth.role = \"tutor\""),
            Some("tutorId = @request.auth.id || studentId = @request.auth.id"),
            Some("tutorId = @request.auth.id"),
        ),
    );

    // Chat rows are written by the conversation aggregator only.
    catalogue.insert(
        "chats".to_string(),
        rules(
            Some(CHAT_PARTICIPANT),
            Some(CHAT_PARTICIPANT),
            None,
            None,
            None,
        ),
    );

    catalogue.insert(
        "messages".to_string(),
        rules(
            Some(MESSAGE_PARTICIPANT),
            Some(MESSAGE_PARTICIPANT),
            Some("senderId = @request.auth.id"),
            Some("receiverId = @request.auth.id"),
            Some("senderId = @request.auth.id"),
        ),
    );

    catalogue.insert(
        "blocked_users".to_string(),
        rules(Some(BLOCKER), Some(BLOCKER), Some(BLOCKER), None, Some(BLOCKER)),
    );

    catalogue.insert(
        "reports".to_string(),
        rules(None, None, Some("reportedBy = @request.auth.id"), None, None),
    );

    catalogue
}
