//! Message reports.
//!
//! Reports are append-only: filed by a participant who can see the message,
//! never edited, and removed only together with the message they point at.
//! Listing them is reserved for administrative callers.

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::error::ValidationError;
use tutorlink_shared::types::{timestamp_now, MessageId, ReportId};
use tutorlink_store::{Database, Report};

use crate::access::AccessControl;
use crate::error::{CoreError, Result};
use crate::retry;

pub struct ModerationLog<'a> {
    db: &'a Database,
    access: &'a AccessControl,
    retries: u32,
}

impl<'a> ModerationLog<'a> {
    pub fn new(db: &'a Database, access: &'a AccessControl, retries: u32) -> Self {
        Self {
            db,
            access,
            retries,
        }
    }

    /// Report a message on behalf of the caller.
    pub fn file_report(&self, auth: &AuthContext, message_id: MessageId) -> Result<Report> {
        let reporter = auth
            .user_id
            .ok_or_else(|| CoreError::denied(Collection::Reports, Action::Create))?;

        let view = self
            .access
            .filter(Collection::Messages, Action::View, auth)?;
        let message = self
            .db
            .find_message(message_id, &view)?
            .ok_or_else(|| CoreError::not_found(Collection::Messages, message_id))?;
        if message.sender_id == reporter {
            return Err(ValidationError::SelfReference {
                field: "messageOwnerId",
            }
            .into());
        }

        let candidate = Report {
            id: ReportId::new(),
            reported_by: reporter,
            message_id,
            message_owner_id: message.sender_id,
            created_at: timestamp_now(),
        };
        self.access
            .authorize(Collection::Reports, Action::Create, auth, &candidate)?;

        match retry::on_busy(self.retries, "file report", || {
            self.db
                .insert_report(reporter, message_id, message.sender_id)
        }) {
            Ok(report) => {
                tracing::info!(
                    report = %report.id,
                    %reporter,
                    message = %message_id,
                    owner = %message.sender_id,
                    "message reported"
                );
                Ok(report)
            }
            Err(CoreError::Store(e)) if e.is_unique_violation() => Err(CoreError::Conflict(
                format!("message {message_id} was already reported"),
            )),
            Err(e) => Err(e),
        }
    }

    /// Every report, oldest first.
    pub fn list(&self, auth: &AuthContext) -> Result<Vec<Report>> {
        let filter = self.access.filter(Collection::Reports, Action::List, auth)?;
        Ok(self.db.list_reports(&filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::MessageContent;
    use crate::testing::{hold_write_lock, impatient_market, market, user};
    use tutorlink_shared::types::Role;

    #[test]
    fn receiver_reports_once() {
        let m = market();
        let (_, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);
        let (message, _) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("spam"))
            .unwrap();

        let report = m.moderation().file_report(&b_auth, message.id).unwrap();
        assert_eq!(report.message_owner_id, message.sender_id);
        assert!(matches!(
            m.moderation().file_report(&b_auth, message.id),
            Err(CoreError::Conflict(_))
        ));
    }

    #[test]
    fn reporting_own_or_unseen_messages_fails() {
        let m = market();
        let (_, a_auth) = user(&m, Role::Student);
        let (b, _) = user(&m, Role::Tutor);
        let (_, outsider) = user(&m, Role::Student);
        let (message, _) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("hello"))
            .unwrap();

        assert!(matches!(
            m.moderation().file_report(&a_auth, message.id),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            m.moderation().file_report(&outsider, message.id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.moderation().file_report(&AuthContext::anonymous(), message.id),
            Err(CoreError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn only_admins_list_reports() {
        let m = market();
        let (_, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);
        let (message, _) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("rude"))
            .unwrap();
        m.moderation().file_report(&b_auth, message.id).unwrap();

        assert!(matches!(
            m.moderation().list(&b_auth),
            Err(CoreError::PermissionDenied { .. })
        ));
        assert_eq!(m.moderation().list(&AuthContext::admin()).unwrap().len(), 1);
    }

    #[test]
    fn locked_store_refuses_a_report_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.db");
        let m = impatient_market(&path);
        let (_, a_auth) = user(&m, Role::Student);
        let (b, b_auth) = user(&m, Role::Tutor);
        let (message, _) = m
            .conversations()
            .send(&a_auth, b, MessageContent::text("spam"))
            .unwrap();

        let writer = hold_write_lock(&path);
        assert!(matches!(
            m.moderation().file_report(&b_auth, message.id),
            Err(CoreError::Conflict(_))
        ));
        drop(writer);

        // Nothing was recorded by the refused attempt.
        m.moderation().file_report(&b_auth, message.id).unwrap();
        assert_eq!(m.moderation().list(&AuthContext::admin()).unwrap().len(), 1);
    }
}
