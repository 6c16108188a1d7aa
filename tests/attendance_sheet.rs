use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use attendance_tracker::attendance::{AttendanceSheet, Clock, Mark, commit};
use attendance_tracker::error::{AppError, GatewayError};
use attendance_tracker::gateway::memory::Operation;
use attendance_tracker::gateway::{MemoryGateway, Row, Table};
use attendance_tracker::model::AttendanceStatus;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).expect("date")
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().expect("object")
}

/// Each call reads one minute later than the previous one, from 08:00.
fn ticking_clock() -> Clock {
    let minutes = Arc::new(AtomicU32::new(0));
    Arc::new(move || {
        let m = minutes.fetch_add(1, Ordering::SeqCst);
        NaiveTime::from_hms_opt(8 + m / 60, m % 60, 0).expect("time")
    })
}

fn two_students() -> MemoryGateway {
    let gw = MemoryGateway::new();
    gw.seed(
        Table::Users,
        [
            row(json!({"id": 1, "name": "A", "student_id": 1001, "course": "BSIT", "year": "1st",
                       "number": "0917", "age": 18, "gender": "Male"})),
            row(json!({"id": 2, "name": "B", "student_id": 1002, "course": "BSIT", "year": "1st",
                       "number": "0918", "age": 19, "gender": "Female"})),
        ],
    );
    gw
}

fn rows_for(gw: &MemoryGateway, student_id: u64, date: NaiveDate) -> Vec<Row> {
    gw.rows(Table::Attendance)
        .into_iter()
        .filter(|r| r["student_id"] == json!(student_id) && r["date"] == json!(date))
        .collect()
}

#[actix_web::test]
async fn later_status_replaces_the_earlier_one() {
    let gw = two_students();
    let mut sheet = AttendanceSheet::open(gw.clone(), jan(8))
        .await
        .expect("open")
        .with_clock(ticking_clock());

    let first = sheet
        .set_status(1, jan(8), AttendanceStatus::Present)
        .await
        .expect("present");
    assert_eq!(sheet.marks().len(), 1);
    assert_eq!(sheet.mark(1), Some(&first));

    let second = sheet
        .set_status(1, jan(8), AttendanceStatus::Late)
        .await
        .expect("late");
    assert_eq!(sheet.marks().len(), 1);
    assert_eq!(sheet.mark(1).map(|m| m.status), Some(AttendanceStatus::Late));
    assert_eq!(sheet.mark(1), Some(&second));
    assert_ne!(first.time, second.time);

    assert_eq!(rows_for(&gw, 1, jan(8)).len(), 1);
    assert_eq!(gw.call_count(Operation::Upsert), 1);
    assert_eq!(gw.call_count(Operation::Update), 1);
}

#[actix_web::test]
async fn clearing_keeps_the_row() {
    let gw = two_students();
    let mut sheet = AttendanceSheet::open(gw.clone(), jan(8)).await.expect("open");

    sheet
        .set_status(2, jan(8), AttendanceStatus::Absent)
        .await
        .expect("absent");
    sheet.clear_status(2, jan(8)).await.expect("clear");

    assert_eq!(sheet.mark(2), Some(&Mark::cleared()));
    let rows = rows_for(&gw, 2, jan(8));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], json!(""));
    assert_eq!(rows[0]["time"], json!(null));
    assert_eq!(gw.call_count(Operation::Delete), 0);

    // the cleared mark is what a fresh load sees too
    let reloaded = AttendanceSheet::open(gw.clone(), jan(8)).await.expect("reopen");
    assert_eq!(reloaded.mark(2), Some(&Mark::cleared()));
}

#[actix_web::test]
async fn every_successful_sequence_leaves_one_entry_with_the_last_status() {
    let gw = two_students();
    let mut sheet = AttendanceSheet::open(gw.clone(), jan(9))
        .await
        .expect("open")
        .with_clock(ticking_clock());

    let sequence = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Present,
    ];
    let mut last = None;
    for status in sequence {
        last = Some(sheet.set_status(1, jan(9), status).await.expect("status"));
    }

    assert_eq!(sheet.marks().len(), 1);
    assert_eq!(sheet.mark(1).copied(), last);
    let rows = rows_for(&gw, 1, jan(9));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], json!("Present"));
}

#[actix_web::test]
async fn remote_failure_is_surfaced_and_changes_nothing() {
    let gw = two_students();
    let mut sheet = AttendanceSheet::open(gw.clone(), jan(8)).await.expect("open");
    gw.fail_next(Operation::Upsert, GatewayError::Constraint("offline".into()));

    let err = sheet
        .set_status(1, jan(8), AttendanceStatus::Present)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Remote(GatewayError::Constraint(_))));
    assert!(sheet.marks().is_empty());
    assert!(gw.rows(Table::Attendance).is_empty());
}

#[actix_web::test]
async fn response_landing_after_a_date_switch_is_dropped() {
    let gw = two_students();
    let mut sheet = AttendanceSheet::open(gw.clone(), jan(8)).await.expect("open");

    let pending = sheet
        .prepare_status(1, jan(8), AttendanceStatus::Present)
        .expect("prepare");
    let in_flight = commit(&gw, pending);
    sheet.select_date(jan(9)).await.expect("switch");
    let confirmed = in_flight.await.expect("write lands");

    assert!(!sheet.apply(confirmed));
    assert!(sheet.marks().is_empty());
    // the write itself still happened, for the 8th
    assert_eq!(rows_for(&gw, 1, jan(8)).len(), 1);

    sheet.select_date(jan(8)).await.expect("back");
    assert_eq!(sheet.mark(1).map(|m| m.status), Some(AttendanceStatus::Present));
}
