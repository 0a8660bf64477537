//! Fixtures for the unit tests in this crate.

use chrono::NaiveDate;

use tutorlink_shared::types::{
    timestamp_now, MessageType, Profile, Role, SlotId, UserId,
};
use tutorlink_shared::validation::parse_time_of_day;

use crate::models::{NewMessage, Slot, SlotState, User};

pub fn sample_user(role: Role) -> User {
    let now = timestamp_now();
    User {
        id: UserId::new(),
        role,
        profile: Profile {
            name: Some("Sample".into()),
            ..Default::default()
        },
        created_at: now,
        updated_at: now,
    }
}

pub fn slot_on(tutor: UserId, date: NaiveDate, start: &str, end: &str) -> Slot {
    let now = timestamp_now();
    Slot {
        id: SlotId::new(),
        tutor_id: tutor,
        date,
        start_time: parse_time_of_day("startTime", start).unwrap(),
        end_time: parse_time_of_day("endTime", end).unwrap(),
        state: SlotState::Free,
        created_at: now,
        updated_at: now,
    }
}

pub fn text_from(sender: UserId, receiver: UserId, body: &str) -> NewMessage {
    NewMessage {
        sender_id: sender,
        receiver_id: receiver,
        kind: MessageType::Text,
        body: Some(body.to_string()),
        file: None,
        created_at: timestamp_now(),
    }
}
