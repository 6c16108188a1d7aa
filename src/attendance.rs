//! Attendance reconciliation for one selected date.
//!
//! The sheet holds at most one [`Mark`] per student and only ever reflects
//! writes the backend has confirmed. A status change is split into three steps
//! so a caller can interleave them with other work: [`AttendanceSheet::prepare_status`]
//! decides between update and upsert, [`commit`] performs the remote write, and
//! [`AttendanceSheet::apply`] folds the confirmation back in, discarding it if
//! the sheet has since moved to another date.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::gateway::{Filter, Gateway, Table, from_rows, to_row};
use crate::model::{AttendanceRecord, AttendanceStatus};

/// Source of the time-of-day stamped on each mark.
pub type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// Local wall clock, truncated to whole seconds to match what the backend stores.
pub fn wall_clock() -> NaiveTime {
    let now = Local::now().time();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Last confirmed status of one student on the sheet's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Mark {
    pub status: AttendanceStatus,
    #[schema(example = "08:30:00", value_type = Option<String>)]
    pub time: Option<NaiveTime>,
}

impl Mark {
    pub fn cleared() -> Self {
        Self {
            status: AttendanceStatus::Cleared,
            time: None,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.status == AttendanceStatus::Cleared
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// A row is known to exist: patch it in place.
    Update,
    /// No row is known: insert, replacing on the (student_id, date) key.
    Upsert,
    /// Empty the status and time of an existing row.
    Clear,
}

/// A write decided against the sheet, not yet sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMark {
    pub student_id: u64,
    pub date: NaiveDate,
    pub mark: Mark,
    pub kind: WriteKind,
}

/// A write the backend has accepted. Only [`commit`] produces these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMark {
    student_id: u64,
    date: NaiveDate,
    mark: Mark,
    kind: WriteKind,
    rows_touched: u64,
}

impl ConfirmedMark {
    pub fn student_id(&self) -> u64 {
        self.student_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn mark(&self) -> Mark {
        self.mark
    }
}

fn key_filters(student_id: u64, date: NaiveDate) -> AppResult<[Filter; 2]> {
    Ok([
        Filter::eq("student_id", student_id)?,
        Filter::eq("date", date)?,
    ])
}

fn patch_for(mark: &Mark) -> AppResult<serde_json::Map<String, Value>> {
    Ok(to_row(&json!({
        "status": mark.status,
        "time": mark.time,
    }))?)
}

async fn upsert<G: Gateway>(gateway: &G, pending: &PendingMark) -> AppResult<()> {
    let row = to_row(&AttendanceRecord {
        student_id: pending.student_id,
        date: pending.date,
        status: pending.mark.status,
        time: pending.mark.time,
    })?;
    gateway.upsert_rows(Table::Attendance, vec![row]).await?;
    Ok(())
}

async fn write<G: Gateway>(gateway: &G, pending: &PendingMark) -> AppResult<u64> {
    match pending.kind {
        WriteKind::Upsert => {
            upsert(gateway, pending).await?;
            Ok(1)
        }
        WriteKind::Update => {
            let filters = key_filters(pending.student_id, pending.date)?;
            let touched = gateway
                .update_rows(Table::Attendance, patch_for(&pending.mark)?, &filters)
                .await?;
            if touched == 0 {
                warn!("no attendance row to update, upserting instead");
                upsert(gateway, pending).await?;
            }
            Ok(1)
        }
        WriteKind::Clear => {
            let filters = key_filters(pending.student_id, pending.date)?;
            Ok(gateway
                .update_rows(Table::Attendance, patch_for(&pending.mark)?, &filters)
                .await?)
        }
    }
}

/// Send a prepared write to the backend.
///
/// An update that lands on no row (the row vanished since the sheet was
/// loaded) falls back to an upsert, so a successful status change always
/// leaves exactly one row behind. Failures are logged and returned; nothing
/// local changes.
#[instrument(name = "attendance_commit", skip(gateway, pending), fields(student_id = pending.student_id, date = %pending.date))]
pub async fn commit<G: Gateway>(gateway: &G, pending: PendingMark) -> AppResult<ConfirmedMark> {
    match write(gateway, &pending).await {
        Ok(rows_touched) => Ok(ConfirmedMark {
            student_id: pending.student_id,
            date: pending.date,
            mark: pending.mark,
            kind: pending.kind,
            rows_touched,
        }),
        Err(e) => {
            error!(error = %e, kind = ?pending.kind, "attendance write failed");
            Err(e)
        }
    }
}

/// Attendance marks for one date, keyed by student id.
pub struct AttendanceSheet<G> {
    gateway: G,
    date: NaiveDate,
    marks: HashMap<u64, Mark>,
    clock: Clock,
}

impl<G: Gateway> AttendanceSheet<G> {
    /// Load the sheet for `date` from the backend.
    pub async fn open(gateway: G, date: NaiveDate) -> AppResult<Self> {
        let marks = fetch_marks(&gateway, date).await?;
        Ok(Self {
            gateway,
            date,
            marks,
            clock: Arc::new(wall_clock),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn mark(&self, student_id: u64) -> Option<&Mark> {
        self.marks.get(&student_id)
    }

    pub fn marks(&self) -> &HashMap<u64, Mark> {
        &self.marks
    }

    /// Switch to another date. The old marks are kept if the fetch fails.
    pub async fn select_date(&mut self, date: NaiveDate) -> AppResult<()> {
        let marks = fetch_marks(&self.gateway, date).await?;
        self.date = date;
        self.marks = marks;
        Ok(())
    }

    fn check_date(&self, date: NaiveDate) -> AppResult<()> {
        if date != self.date {
            warn!(requested = %date, selected = %self.date, "write for a date the sheet is not showing");
            return Err(AppError::StaleDate);
        }
        Ok(())
    }

    /// Decide how to record `status`, stamping it with the current time.
    pub fn prepare_status(
        &self,
        student_id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> AppResult<PendingMark> {
        self.check_date(date)?;
        if status == AttendanceStatus::Cleared {
            return Err(AppError::validation("Use clear to remove a status"));
        }
        let kind = if self.marks.contains_key(&student_id) {
            WriteKind::Update
        } else {
            WriteKind::Upsert
        };
        Ok(PendingMark {
            student_id,
            date,
            mark: Mark {
                status,
                time: Some((self.clock)()),
            },
            kind,
        })
    }

    pub fn prepare_clear(&self, student_id: u64, date: NaiveDate) -> AppResult<PendingMark> {
        self.check_date(date)?;
        Ok(PendingMark {
            student_id,
            date,
            mark: Mark::cleared(),
            kind: WriteKind::Clear,
        })
    }

    /// Fold a confirmation into the sheet, replacing any earlier mark for the
    /// student. Returns false when the confirmation is for another date and was
    /// discarded.
    pub fn apply(&mut self, confirmed: ConfirmedMark) -> bool {
        if confirmed.date != self.date {
            debug!(
                student_id = confirmed.student_id,
                confirmed = %confirmed.date,
                selected = %self.date,
                "discarding confirmation for a date no longer shown"
            );
            return false;
        }

        if confirmed.kind == WriteKind::Clear && confirmed.rows_touched == 0 {
            // no row to clear; a reload would show no mark either
            self.marks.remove(&confirmed.student_id);
            return true;
        }
        self.marks.insert(confirmed.student_id, confirmed.mark);
        true
    }

    /// Record `status` for a student: update if a mark exists, upsert if not.
    /// Local state changes only after the backend confirms.
    pub async fn set_status(
        &mut self,
        student_id: u64,
        date: NaiveDate,
        status: AttendanceStatus,
    ) -> AppResult<Mark> {
        let pending = self.prepare_status(student_id, date, status)?;
        let confirmed = commit(&self.gateway, pending).await?;
        let mark = confirmed.mark;
        self.apply(confirmed);
        info!(student_id, %date, status = %status, "attendance recorded");
        Ok(mark)
    }

    /// Empty a student's status and time. The row is kept.
    pub async fn clear_status(&mut self, student_id: u64, date: NaiveDate) -> AppResult<()> {
        let pending = self.prepare_clear(student_id, date)?;
        let confirmed = commit(&self.gateway, pending).await?;
        self.apply(confirmed);
        info!(student_id, %date, "attendance cleared");
        Ok(())
    }
}

/// Rows for `date`. Should the backend ever hold two rows for one student, the
/// later one wins so the sheet still has a single mark per student.
async fn fetch_marks<G: Gateway>(gateway: &G, date: NaiveDate) -> AppResult<HashMap<u64, Mark>> {
    let rows = gateway
        .query_rows(Table::Attendance, &[Filter::eq("date", date)?], None)
        .await
        .map_err(|e| {
            error!(error = %e, %date, "Error fetching attendance");
            e
        })?;

    let records: Vec<AttendanceRecord> = from_rows(rows)?;
    let mut marks = HashMap::with_capacity(records.len());
    for record in records {
        let mark = Mark {
            status: record.status,
            time: record.time,
        };
        if marks.insert(record.student_id, mark).is_some() {
            warn!(student_id = record.student_id, %date, "duplicate attendance rows");
        }
    }
    Ok(marks)
}
