//! Slot persistence and the guarded state transitions.
//!
//! Every transition is a single conditional `UPDATE` on the `state` column,
//! so two writers racing on the same slot are serialized by SQLite and only
//! one of them sees its precondition hold.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Transaction};

use tutorlink_shared::types::{timestamp_now, SlotId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::filter::SqlFilter;
use crate::models::{Slot, SlotState};
use crate::rows;

const SLOT_COLUMNS: &str = "slots.id, slots.tutor_id, slots.date, slots.start_time, slots.end_time,
     slots.state, slots.student_id, slots.created_at, slots.updated_at";

/// Outcome of [`Database::insert_slot_checked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotInsert {
    Created,
    /// An existing slot of the same tutor and day intersects the new one.
    Overlaps(Slot),
}

/// Outcome of a guarded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The precondition held; carries the slot after the update.
    Applied(Slot),
    /// The slot was not in the required state; carries it unchanged.
    Rejected(Slot),
}

/// Narrowing applied on top of the caller's access filter.
#[derive(Debug, Clone, Default)]
pub struct SlotQuery {
    pub tutor_id: Option<UserId>,
    pub date: Option<NaiveDate>,
    /// Hide slots whose tutor is in a block relation with this user.
    pub viewer: Option<UserId>,
}

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a slot without looking at its neighbours.
    pub fn insert_slot(&self, slot: &Slot) -> Result<()> {
        insert_slot_row(self.conn(), slot)
    }

    /// Insert `slot` unless it overlaps another slot of the same tutor on the
    /// same day. The check and the insert share one immediate transaction.
    pub fn insert_slot_checked(&self, slot: &Slot) -> Result<SlotInsert> {
        self.immediate(|tx| {
            if let Some(existing) =
                overlapping_slot(tx, slot.tutor_id, slot.date, slot.start_time, slot.end_time)?
            {
                return Ok(SlotInsert::Overlaps(existing));
            }
            insert_slot_row(tx, slot)?;
            Ok(SlotInsert::Created)
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_slot(&self, id: SlotId) -> Result<Slot> {
        fetch_slot(self.conn(), id)
    }

    /// Fetch a slot only if `filter` admits it.
    pub fn find_slot(&self, id: SlotId, filter: &SqlFilter) -> Result<Option<Slot>> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE slots.id = ? AND ({})",
            filter.clause
        );
        let mut values = vec![SqlValue::Text(id.to_string())];
        values.extend(filter.params.iter().cloned());
        let slot = self
            .conn()
            .query_row(&sql, params_from_iter(values), row_to_slot)
            .optional()?;
        Ok(slot)
    }

    /// List slots admitted by `filter` and `query`, by day then start time.
    pub fn list_slots(&self, filter: &SqlFilter, query: &SlotQuery) -> Result<Vec<Slot>> {
        let mut clauses = vec![format!("({})", filter.clause)];
        let mut values: Vec<SqlValue> = filter.params.clone();

        if let Some(tutor) = query.tutor_id {
            clauses.push("slots.tutor_id = ?".into());
            values.push(SqlValue::Text(tutor.to_string()));
        }
        if let Some(date) = query.date {
            clauses.push("slots.date = ?".into());
            values.push(SqlValue::Text(date.to_string()));
        }
        if let Some(viewer) = query.viewer {
            clauses.push(
                "NOT EXISTS (SELECT 1 FROM blocked_users b
                             WHERE (b.user_id = ? AND b.blocked_user_id = slots.tutor_id)
                                OR (b.user_id = slots.tutor_id AND b.blocked_user_id = ?))"
                    .into(),
            );
            values.push(SqlValue::Text(viewer.to_string()));
            values.push(SqlValue::Text(viewer.to_string()));
        }

        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE {}
             ORDER BY slots.date ASC, slots.start_time ASC",
            clauses.join(" AND ")
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_slot)?;

        let mut slots = Vec::new();
        for row in rows {
            slots.push(row?);
        }
        Ok(slots)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// `Free -> Booked(student)`.
    pub fn book_slot(&self, id: SlotId, student: UserId) -> Result<Transition> {
        self.transition(
            id,
            "UPDATE slots SET state = 'booked', student_id = ?2, updated_at = ?3
             WHERE id = ?1 AND state = 'free'",
            Some(student),
        )
    }

    /// `Booked -> Paid`, keeping the student.
    pub fn mark_slot_paid(&self, id: SlotId) -> Result<Transition> {
        self.transition(
            id,
            "UPDATE slots SET state = 'paid', updated_at = ?3
             WHERE id = ?1 AND state = 'booked'",
            None,
        )
    }

    /// `Booked | Paid -> Free`, clearing the student.
    pub fn cancel_slot(&self, id: SlotId) -> Result<Transition> {
        self.transition(
            id,
            "UPDATE slots SET state = 'free', student_id = NULL, updated_at = ?3
             WHERE id = ?1 AND state <> 'free'",
            None,
        )
    }

    fn transition(&self, id: SlotId, sql: &str, student: Option<UserId>) -> Result<Transition> {
        self.immediate(|tx| {
            let affected = tx.execute(
                sql,
                params![
                    id.to_string(),
                    student.map(|s| s.to_string()),
                    rows::ts(&timestamp_now())
                ],
            )?;
            let slot = fetch_slot(tx, id)?;
            if affected == 1 {
                tracing::debug!(slot = %id, state = slot.state.as_str(), "slot transition applied");
                Ok(Transition::Applied(slot))
            } else {
                Ok(Transition::Rejected(slot))
            }
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Returns `true` if a row was deleted.
    pub fn delete_slot(&self, id: SlotId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM slots WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn insert_slot_row(conn: &rusqlite::Connection, slot: &Slot) -> Result<()> {
    conn.execute(
        "INSERT INTO slots (id, tutor_id, date, start_time, end_time, state, student_id,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            slot.id.to_string(),
            slot.tutor_id.to_string(),
            slot.date.to_string(),
            rows::time_of_day(&slot.start_time),
            rows::time_of_day(&slot.end_time),
            slot.state.as_str(),
            slot.state.student_id().map(|s| s.to_string()),
            rows::ts(&slot.created_at),
            rows::ts(&slot.updated_at),
        ],
    )?;
    Ok(())
}

fn overlapping_slot(
    tx: &Transaction<'_>,
    tutor: UserId,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<Option<Slot>> {
    // `HH:MM` text sorts like the time it encodes.
    let slot = tx
        .query_row(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM slots
                 WHERE tutor_id = ?1 AND date = ?2 AND start_time < ?4 AND ?3 < end_time
                 ORDER BY start_time ASC LIMIT 1"
            ),
            params![
                tutor.to_string(),
                date.to_string(),
                rows::time_of_day(&start),
                rows::time_of_day(&end),
            ],
            row_to_slot,
        )
        .optional()?;
    Ok(slot)
}

fn fetch_slot(conn: &rusqlite::Connection, id: SlotId) -> Result<Slot> {
    conn.query_row(
        &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
        params![id.to_string()],
        row_to_slot,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    })
}

fn row_to_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Slot> {
    let state: String = row.get(5)?;
    let student: Option<UserId> = rows::opt_id(row, 6)?;

    let state = match (state.as_str(), student) {
        ("free", None) => SlotState::Free,
        ("booked", Some(student_id)) => SlotState::Booked { student_id },
        ("paid", Some(student_id)) => SlotState::Paid { student_id },
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(rows::UnexpectedValue(state)),
            ))
        }
    };

    Ok(Slot {
        id: rows::id(row, 0)?,
        tutor_id: rows::id(row, 1)?,
        date: rows::date(row, 2)?,
        start_time: rows::time(row, 3)?,
        end_time: rows::time(row, 4)?,
        state,
        created_at: rows::timestamp(row, 7)?,
        updated_at: rows::timestamp(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_user, slot_on};
    use tutorlink_shared::types::Role;

    fn setup() -> (Database, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let tutor = sample_user(Role::Tutor);
        let student = sample_user(Role::Student);
        db.insert_user(&tutor).unwrap();
        db.insert_user(&student).unwrap();
        (db, tutor.id, student.id)
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    #[test]
    fn overlapping_insert_is_rejected() {
        let (db, tutor, _) = setup();
        let first = slot_on(tutor, monday(), "09:00", "10:00");
        assert_eq!(db.insert_slot_checked(&first).unwrap(), SlotInsert::Created);

        let clash = slot_on(tutor, monday(), "09:30", "10:30");
        assert_eq!(
            db.insert_slot_checked(&clash).unwrap(),
            SlotInsert::Overlaps(first.clone())
        );

        // Touching intervals do not overlap.
        let next = slot_on(tutor, monday(), "10:00", "11:00");
        assert_eq!(db.insert_slot_checked(&next).unwrap(), SlotInsert::Created);
    }

    #[test]
    fn store_rejects_inverted_interval() {
        let (db, tutor, _) = setup();
        let mut slot = slot_on(tutor, monday(), "09:00", "10:00");
        slot.end_time = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let err = db.insert_slot(&slot).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn book_is_compare_and_set() {
        let (db, tutor, student) = setup();
        let other = sample_user(Role::Student);
        db.insert_user(&other).unwrap();

        let slot = slot_on(tutor, monday(), "09:00", "10:00");
        db.insert_slot(&slot).unwrap();

        let booked = match db.book_slot(slot.id, student).unwrap() {
            Transition::Applied(s) => s,
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(booked.state, SlotState::Booked { student_id: student });

        match db.book_slot(slot.id, other.id).unwrap() {
            Transition::Rejected(s) => assert_eq!(s.state.student_id(), Some(student)),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn paid_requires_booked_and_cancel_clears() {
        let (db, tutor, student) = setup();
        let slot = slot_on(tutor, monday(), "09:00", "10:00");
        db.insert_slot(&slot).unwrap();

        assert!(matches!(db.mark_slot_paid(slot.id).unwrap(), Transition::Rejected(_)));
        assert!(matches!(db.cancel_slot(slot.id).unwrap(), Transition::Rejected(_)));

        db.book_slot(slot.id, student).unwrap();
        let paid = db.mark_slot_paid(slot.id).unwrap();
        assert!(matches!(
            paid,
            Transition::Applied(Slot { state: SlotState::Paid { .. }, .. })
        ));

        let cancelled = db.cancel_slot(slot.id).unwrap();
        assert!(matches!(
            cancelled,
            Transition::Applied(Slot { state: SlotState::Free, .. })
        ));
    }

    #[test]
    fn transition_on_missing_slot_is_not_found() {
        let (db, _, student) = setup();
        assert!(matches!(
            db.book_slot(SlotId::new(), student),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_filters_by_tutor_date_and_blocks() {
        let (db, tutor, student) = setup();
        let other_tutor = sample_user(Role::Tutor);
        db.insert_user(&other_tutor).unwrap();

        let tuesday = monday().succ_opt().unwrap();
        db.insert_slot(&slot_on(tutor, monday(), "11:00", "12:00")).unwrap();
        db.insert_slot(&slot_on(tutor, monday(), "09:00", "10:00")).unwrap();
        db.insert_slot(&slot_on(tutor, tuesday, "09:00", "10:00")).unwrap();
        db.insert_slot(&slot_on(other_tutor.id, monday(), "09:00", "10:00")).unwrap();

        let all = db.list_slots(&SqlFilter::allow_all(), &SlotQuery::default()).unwrap();
        assert_eq!(all.len(), 4);

        let query = SlotQuery {
            tutor_id: Some(tutor),
            date: Some(monday()),
            viewer: None,
        };
        let mine = db.list_slots(&SqlFilter::allow_all(), &query).unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].start_time < mine[1].start_time);

        db.insert_block(other_tutor.id, student).unwrap();
        let visible = db
            .list_slots(
                &SqlFilter::allow_all(),
                &SlotQuery {
                    viewer: Some(student),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(visible.len(), 3);
        assert!(visible.iter().all(|s| s.tutor_id == tutor));

        assert!(db.list_slots(&SqlFilter::deny_all(), &SlotQuery::default()).unwrap().is_empty());
    }

    #[test]
    fn delete_reports_whether_a_row_went() {
        let (db, tutor, _) = setup();
        let slot = slot_on(tutor, monday(), "09:00", "10:00");
        db.insert_slot(&slot).unwrap();
        assert!(db.delete_slot(slot.id).unwrap());
        assert!(!db.delete_slot(slot.id).unwrap());
    }
}
