use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::attendance::{AttendanceSheet, Mark};
use crate::auth::Session;
use crate::error::AppResult;
use crate::gateway::MySqlGateway;
use crate::model::{AttendanceStatus, Course};
use crate::report::{SheetRow, build_report, sheet_rows};
use crate::roster::Roster;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SheetQuery {
    /// Defaults to today
    #[param(value_type = Option<String>, format = Date, example = "2025-01-08")]
    pub date: Option<NaiveDate>,
    pub course: Option<Course>,
}

impl SheetQuery {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }
}

#[derive(Serialize, ToSchema)]
pub struct SheetResponse {
    #[schema(example = "2025-01-08", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub courses: Vec<Course>,
    pub rows: Vec<SheetRow>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetStatusReq {
    #[schema(example = "2025-01-08", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Deserialize, IntoParams)]
pub struct DateQuery {
    #[param(value_type = String, format = Date, example = "2025-01-08")]
    pub date: NaiveDate,
}

/// Attendance sheet for one date
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(SheetQuery),
    responses(
        (status = 200, description = "Students with their mark for the date", body = SheetResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_sheet(
    session: Session,
    query: web::Query<SheetQuery>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let roster = Roster::load(gateway.get_ref().clone()).await?;
    let sheet = AttendanceSheet::open(gateway.get_ref().clone(), query.date()).await?;

    Ok(HttpResponse::Ok().json(SheetResponse {
        date: sheet.date(),
        courses: roster.courses(),
        rows: sheet_rows(roster.in_course(query.course), sheet.marks()),
    }))
}

/// Record a status; the first one of the day creates the row, later ones replace it
#[utoipa::path(
    put,
    path = "/api/attendance/{student_id}",
    params(("student_id" = u64, Path, description = "Student row id")),
    request_body = SetStatusReq,
    responses(
        (status = 200, description = "Confirmed mark", body = Mark),
        (status = 400, description = "Invalid status"),
        (status = 502, description = "Backend rejected the write", body = Object, example = json!({
            "message": "Something went wrong, Contact with system admin"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn set_status(
    session: Session,
    path: web::Path<u64>,
    payload: web::Json<SetStatusReq>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let mut sheet = AttendanceSheet::open(gateway.get_ref().clone(), payload.date).await?;
    let mark = sheet
        .set_status(path.into_inner(), payload.date, payload.status)
        .await?;
    Ok(HttpResponse::Ok().json(mark))
}

/// Empty a student's status and time for the date; the row itself is kept
#[utoipa::path(
    delete,
    path = "/api/attendance/{student_id}",
    params(("student_id" = u64, Path, description = "Student row id"), DateQuery),
    responses(
        (status = 200, description = "Cleared", body = Mark),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clear_status(
    session: Session,
    path: web::Path<u64>,
    query: web::Query<DateQuery>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let mut sheet = AttendanceSheet::open(gateway.get_ref().clone(), query.date).await?;
    sheet.clear_status(path.into_inner(), query.date).await?;
    Ok(HttpResponse::Ok().json(Mark::cleared()))
}

/// Printable attendance report
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(SheetQuery),
    responses(
        (status = 200, description = "Report rows", body = AttendanceReport, example = json!({
            "title": "Attendance Report",
            "course": "BSIT",
            "date": "Wednesday, 01/08/2025",
            "generated": "Date: January 8, 2025 Time: 3:07 PM",
            "rows": [{"name": "Juan Dela Cruz", "course": "BSIT", "date": "Wednesday, 01/08/2025", "status": "N/A", "time": "--:--"}],
            "footer": "Generated by Attendance Monitoring System"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn report(
    session: Session,
    query: web::Query<SheetQuery>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let roster = Roster::load(gateway.get_ref().clone()).await?;
    let sheet = AttendanceSheet::open(gateway.get_ref().clone(), query.date()).await?;

    Ok(HttpResponse::Ok().json(build_report(
        roster.students(),
        sheet.marks(),
        sheet.date(),
        query.course,
        Local::now().naive_local(),
    )))
}
