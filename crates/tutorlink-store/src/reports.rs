//! Append-only moderation reports. There is no update or delete here; a
//! report only disappears with the message it points at.

use rusqlite::{params, params_from_iter};

use tutorlink_shared::types::{timestamp_now, MessageId, ReportId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::filter::SqlFilter;
use crate::models::Report;
use crate::rows;

const REPORT_COLUMNS: &str =
    "reports.id, reports.reported_by, reports.message_id, reports.message_owner_id, reports.created_at";

impl Database {
    /// File a report. A second report by the same user on the same message
    /// violates the reporter/message index.
    pub fn insert_report(
        &self,
        reported_by: UserId,
        message_id: MessageId,
        message_owner_id: UserId,
    ) -> Result<Report> {
        let report = Report {
            id: ReportId::new(),
            reported_by,
            message_id,
            message_owner_id,
            created_at: timestamp_now(),
        };
        self.conn().execute(
            "INSERT INTO reports (id, reported_by, message_id, message_owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                report.id.to_string(),
                report.reported_by.to_string(),
                report.message_id.to_string(),
                report.message_owner_id.to_string(),
                rows::ts(&report.created_at),
            ],
        )?;
        Ok(report)
    }

    /// Reports admitted by `filter`, oldest first.
    pub fn list_reports(&self, filter: &SqlFilter) -> Result<Vec<Report>> {
        let sql = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE {} ORDER BY reports.created_at ASC",
            filter.clause
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.params.iter()), row_to_report)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    pub fn count_reports_for_message(&self, message_id: MessageId) -> Result<u32> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reports WHERE message_id = ?1",
            params![message_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: rows::id(row, 0)?,
        reported_by: rows::id(row, 1)?,
        message_id: rows::id(row, 2)?,
        message_owner_id: rows::id(row, 3)?,
        created_at: rows::timestamp(row, 4)?,
    })
}
