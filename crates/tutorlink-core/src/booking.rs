//! Slot lifecycle: `Free -> Booked -> Paid`, and back to `Free` only through
//! an explicit cancellation.
//!
//! Each transition is one compare-and-set in the store; when two students
//! race for the same slot exactly one of them books it and the other gets
//! [`CoreError::Conflict`].

use chrono::NaiveDate;

use tutorlink_shared::auth::AuthContext;
use tutorlink_shared::collections::{Action, Collection};
use tutorlink_shared::types::{timestamp_now, Role, SlotId, UserId};
use tutorlink_shared::validation::{format_time_of_day, parse_time_of_day};
use tutorlink_store::{Database, Slot, SlotInsert, SlotQuery, SlotState, Transition};

use crate::access::AccessControl;
use crate::blocking::BlockingGuard;
use crate::error::{CoreError, OrNotFound, RangeError, Result};
use crate::retry;

/// Optional narrowing for [`SlotBookingManager::list`].
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub tutor_id: Option<UserId>,
    pub date: Option<NaiveDate>,
}

pub struct SlotBookingManager<'a> {
    db: &'a Database,
    access: &'a AccessControl,
    retries: u32,
}

impl<'a> SlotBookingManager<'a> {
    pub fn new(db: &'a Database, access: &'a AccessControl, retries: u32) -> Self {
        Self {
            db,
            access,
            retries,
        }
    }

    fn blocking(&self) -> BlockingGuard<'a> {
        BlockingGuard::new(self.db, self.access, self.retries)
    }

    /// Offer a new free slot. `start` and `end` are `HH:MM`.
    pub fn create(
        &self,
        auth: &AuthContext,
        tutor_id: UserId,
        date: NaiveDate,
        start: &str,
        end: &str,
    ) -> Result<Slot> {
        let start_time = parse_time_of_day("startTime", start)?;
        let end_time = parse_time_of_day("endTime", end)?;
        if start_time >= end_time {
            return Err(CoreError::InvalidRange(RangeError::StartNotBeforeEnd {
                start: start.to_string(),
                end: end.to_string(),
            }));
        }

        let now = timestamp_now();
        let slot = Slot {
            id: SlotId::new(),
            tutor_id,
            date,
            start_time,
            end_time,
            state: SlotState::Free,
            created_at: now,
            updated_at: now,
        };
        self.access
            .authorize(Collection::Slots, Action::Create, auth, &slot)?;
        self.db
            .get_user(tutor_id)
            .or_not_found(Collection::Users, tutor_id)?;

        match retry::on_busy(self.retries, "create slot", || {
            self.db.insert_slot_checked(&slot)
        })? {
            SlotInsert::Created => {
                tracing::info!(slot = %slot.id, tutor = %tutor_id, %date, start, end, "slot created");
                Ok(slot)
            }
            SlotInsert::Overlaps(existing) => {
                tracing::debug!(slot = %existing.id, tutor = %tutor_id, "slot overlap");
                Err(CoreError::InvalidRange(RangeError::Overlap {
                    existing: existing.id,
                    start: format_time_of_day(existing.start_time),
                    end: format_time_of_day(existing.end_time),
                }))
            }
        }
    }

    /// Book a free slot for the calling student.
    pub fn book(&self, auth: &AuthContext, slot_id: SlotId) -> Result<Slot> {
        let student = match (auth.user_id, auth.role) {
            (Some(id), Some(Role::Student)) => id,
            _ => return Err(CoreError::denied(Collection::Slots, Action::Update)),
        };

        let slot = self
            .db
            .get_slot(slot_id)
            .or_not_found(Collection::Slots, slot_id)?;
        if slot.tutor_id == student {
            return Err(CoreError::denied(Collection::Slots, Action::Update));
        }
        // Before the view check: a booked slot is hidden from the student
        // who lost the race for it, and that loss must read as Conflict.
        if slot.state.is_booked() {
            return Err(CoreError::Conflict(format!(
                "slot {slot_id} is already {}",
                slot.state.as_str()
            )));
        }
        if !self.access.allows(Collection::Slots, Action::View, auth, &slot) {
            return Err(CoreError::not_found(Collection::Slots, slot_id));
        }
        if self.blocking().is_blocked(student, slot.tutor_id)? {
            tracing::warn!(slot = %slot_id, %student, tutor = %slot.tutor_id, "booking across a block");
            return Err(CoreError::denied(Collection::Slots, Action::Update));
        }

        match retry::on_busy(self.retries, "book slot", || self.db.book_slot(slot_id, student))
            .map_err(|e| not_missing(e, slot_id))?
        {
            Transition::Applied(slot) => {
                tracing::info!(slot = %slot_id, %student, "slot booked");
                Ok(slot)
            }
            Transition::Rejected(current) => {
                tracing::warn!(slot = %slot_id, %student, state = current.state.as_str(), "booking lost");
                Err(CoreError::Conflict(format!(
                    "slot {slot_id} is already {}",
                    current.state.as_str()
                )))
            }
        }
    }

    /// Release a booked or paid slot back to free.
    pub fn cancel(&self, auth: &AuthContext, slot_id: SlotId) -> Result<Slot> {
        let slot = self
            .db
            .get_slot(slot_id)
            .or_not_found(Collection::Slots, slot_id)?;
        self.access
            .authorize(Collection::Slots, Action::Update, auth, &slot)?;

        match retry::on_busy(self.retries, "cancel slot", || self.db.cancel_slot(slot_id))
            .map_err(|e| not_missing(e, slot_id))?
        {
            Transition::Applied(slot) => {
                tracing::info!(slot = %slot_id, by = ?auth.user_id, "booking cancelled");
                Ok(slot)
            }
            Transition::Rejected(_) => Err(CoreError::Conflict(format!(
                "slot {slot_id} is not booked"
            ))),
        }
    }

    /// Record payment for a booked slot. Only the slot's tutor may do this.
    pub fn mark_paid(&self, auth: &AuthContext, slot_id: SlotId) -> Result<Slot> {
        let slot = self
            .db
            .get_slot(slot_id)
            .or_not_found(Collection::Slots, slot_id)?;
        if !auth.is_admin && auth.user_id != Some(slot.tutor_id) {
            return Err(CoreError::denied(Collection::Slots, Action::Update));
        }
        self.access
            .authorize(Collection::Slots, Action::Update, auth, &slot)?;

        match retry::on_busy(self.retries, "mark slot paid", || {
            self.db.mark_slot_paid(slot_id)
        })
        .map_err(|e| not_missing(e, slot_id))?
        {
            Transition::Applied(slot) => {
                tracing::info!(slot = %slot_id, "slot paid");
                Ok(slot)
            }
            Transition::Rejected(current) => Err(CoreError::Conflict(format!(
                "slot {slot_id} is {}, only booked slots can be paid",
                current.state.as_str()
            ))),
        }
    }

    pub fn delete(&self, auth: &AuthContext, slot_id: SlotId) -> Result<()> {
        let slot = self
            .db
            .get_slot(slot_id)
            .or_not_found(Collection::Slots, slot_id)?;
        self.access
            .authorize(Collection::Slots, Action::Delete, auth, &slot)?;

        if !retry::on_busy(self.retries, "delete slot", || self.db.delete_slot(slot_id))? {
            return Err(CoreError::not_found(Collection::Slots, slot_id));
        }
        tracing::info!(slot = %slot_id, "slot deleted");
        Ok(())
    }

    /// A slot the caller may view. Slots of a tutor in a block relation with
    /// the caller are reported as missing.
    pub fn get(&self, auth: &AuthContext, slot_id: SlotId) -> Result<Slot> {
        let filter = self.access.filter(Collection::Slots, Action::View, auth)?;
        let slot = self
            .db
            .find_slot(slot_id, &filter)?
            .ok_or_else(|| CoreError::not_found(Collection::Slots, slot_id))?;

        if let Some(viewer) = auth.user_id {
            if viewer != slot.tutor_id && self.blocking().is_blocked(viewer, slot.tutor_id)? {
                return Err(CoreError::not_found(Collection::Slots, slot_id));
            }
        }
        Ok(slot)
    }

    pub fn list(&self, auth: &AuthContext, narrow: &SlotFilter) -> Result<Vec<Slot>> {
        let filter = self.access.filter(Collection::Slots, Action::List, auth)?;
        let query = SlotQuery {
            tutor_id: narrow.tutor_id,
            date: narrow.date,
            viewer: auth.user_id,
        };
        Ok(self.db.list_slots(&filter, &query)?)
    }
}

/// A slot that vanished between the check and the transition.
fn not_missing(err: CoreError, slot_id: SlotId) -> CoreError {
    match err {
        CoreError::Store(tutorlink_store::StoreError::NotFound) => {
            CoreError::not_found(Collection::Slots, slot_id)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{market, user};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    #[test]
    fn tutor_creates_and_student_books() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (student, student_auth) = user(&m, Role::Student);

        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();
        assert_eq!(slot.state, SlotState::Free);

        let booked = m.slots().book(&student_auth, slot.id).unwrap();
        assert_eq!(booked.state, SlotState::Booked { student_id: student });

        let paid = m.slots().mark_paid(&tutor_auth, slot.id).unwrap();
        assert!(paid.state.is_paid());
        assert_eq!(paid.state.student_id(), Some(student));
    }

    #[test]
    fn student_cannot_create() {
        let m = market();
        let (student, auth) = user(&m, Role::Student);
        let err = m
            .slots()
            .create(&auth, student, monday(), "09:00", "10:00")
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::PermissionDenied {
                collection: Collection::Slots,
                action: Action::Create
            }
        ));
    }

    #[test]
    fn tutor_cannot_create_for_someone_else() {
        let m = market();
        let (_, auth) = user(&m, Role::Tutor);
        let (other, _) = user(&m, Role::Tutor);
        assert!(matches!(
            m.slots().create(&auth, other, monday(), "09:00", "10:00"),
            Err(CoreError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn bad_times_are_rejected() {
        let m = market();
        let (tutor, auth) = user(&m, Role::Tutor);

        assert!(matches!(
            m.slots().create(&auth, tutor, monday(), "09:00", "08:00"),
            Err(CoreError::InvalidRange(RangeError::StartNotBeforeEnd { .. }))
        ));
        assert!(matches!(
            m.slots().create(&auth, tutor, monday(), "09:00", "09:00"),
            Err(CoreError::InvalidRange(_))
        ));
        assert!(matches!(
            m.slots().create(&auth, tutor, monday(), "9am", "10:00"),
            Err(CoreError::Validation(_))
        ));

        m.slots()
            .create(&auth, tutor, monday(), "09:00", "10:00")
            .unwrap();
        assert!(matches!(
            m.slots().create(&auth, tutor, monday(), "09:30", "11:00"),
            Err(CoreError::InvalidRange(RangeError::Overlap { .. }))
        ));
    }

    #[test]
    fn second_booking_conflicts() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (_, first) = user(&m, Role::Student);
        let (_, second) = user(&m, Role::Student);
        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();

        m.slots().book(&first, slot.id).unwrap();
        assert!(matches!(
            m.slots().book(&second, slot.id),
            Err(CoreError::Conflict(_))
        ));
        // The booked slot is no longer visible to the second student.
        assert!(matches!(
            m.slots().get(&second, slot.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn tutors_and_anonymous_callers_cannot_book() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (_, other_tutor) = user(&m, Role::Tutor);
        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();

        for auth in [tutor_auth, other_tutor, AuthContext::anonymous()] {
            assert!(matches!(
                m.slots().book(&auth, slot.id),
                Err(CoreError::PermissionDenied { .. })
            ));
        }
    }

    #[test]
    fn blocked_student_neither_sees_nor_books() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (student, student_auth) = user(&m, Role::Student);
        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();

        m.blocking().block(&tutor_auth, student).unwrap();
        assert!(m
            .slots()
            .list(&student_auth, &SlotFilter::default())
            .unwrap()
            .is_empty());
        assert!(matches!(
            m.slots().get(&student_auth, slot.id),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            m.slots().book(&student_auth, slot.id),
            Err(CoreError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn cancel_and_mark_paid_guards() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (_, student_auth) = user(&m, Role::Student);
        let (_, stranger) = user(&m, Role::Student);
        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();

        assert!(matches!(
            m.slots().mark_paid(&tutor_auth, slot.id),
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            m.slots().cancel(&tutor_auth, slot.id),
            Err(CoreError::Conflict(_))
        ));

        m.slots().book(&student_auth, slot.id).unwrap();
        assert!(matches!(
            m.slots().mark_paid(&student_auth, slot.id),
            Err(CoreError::PermissionDenied { .. })
        ));
        assert!(matches!(
            m.slots().cancel(&stranger, slot.id),
            Err(CoreError::PermissionDenied { .. })
        ));

        let freed = m.slots().cancel(&student_auth, slot.id).unwrap();
        assert_eq!(freed.state, SlotState::Free);
    }

    #[test]
    fn list_shows_own_and_open_slots() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (_, first) = user(&m, Role::Student);
        let (_, second) = user(&m, Role::Student);

        let a = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();
        m.slots()
            .create(&tutor_auth, tutor, monday(), "10:00", "11:00")
            .unwrap();
        m.slots().book(&first, a.id).unwrap();

        let all = SlotFilter::default();
        assert_eq!(m.slots().list(&tutor_auth, &all).unwrap().len(), 2);
        assert_eq!(m.slots().list(&first, &all).unwrap().len(), 2);
        assert_eq!(m.slots().list(&second, &all).unwrap().len(), 1);
        assert_eq!(
            m.slots().list(&AuthContext::anonymous(), &all).unwrap().len(),
            1
        );
    }

    #[test]
    fn only_the_tutor_deletes() {
        let m = market();
        let (tutor, tutor_auth) = user(&m, Role::Tutor);
        let (_, student_auth) = user(&m, Role::Student);
        let slot = m
            .slots()
            .create(&tutor_auth, tutor, monday(), "09:00", "10:00")
            .unwrap();

        assert!(matches!(
            m.slots().delete(&student_auth, slot.id),
            Err(CoreError::PermissionDenied { .. })
        ));
        m.slots().delete(&tutor_auth, slot.id).unwrap();
        assert!(matches!(
            m.slots().delete(&tutor_auth, slot.id),
            Err(CoreError::NotFound { .. })
        ));
    }
}
