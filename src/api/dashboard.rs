use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use utoipa::{IntoParams, ToSchema};

use crate::auth::Session;
use crate::dashboard::{Demographics, YearFilter, student_overview};
use crate::error::AppResult;
use crate::gateway::MySqlGateway;
use crate::view::{Page, PageMeta};

#[derive(Debug, Deserialize, IntoParams)]
pub struct YearQuery {
    /// "All" (default) or a year level such as "2nd"
    pub year: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PageEntry {
    pub page: Page,
    #[schema(example = "/teachers/attendance")]
    pub route: String,
    #[serde(flatten)]
    pub meta: PageMeta,
}

/// Gender and year-level breakdown of the roster
#[utoipa::path(
    get,
    path = "/api/dashboard/teacher",
    params(YearQuery),
    responses(
        (status = 200, description = "Dashboard figures; `message` is \"No data found.\" when the roster is empty", body = DashboardSummary),
        (status = 400, description = "Unknown year")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn teacher_dashboard(
    session: Session,
    query: web::Query<YearQuery>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let filter: YearFilter = query.year.as_deref().unwrap_or_default().parse()?;
    let demographics = Demographics::load(gateway.get_ref()).await?;
    Ok(HttpResponse::Ok().json(demographics.summary(filter)))
}

/// The signed-in student's account, absences and schedule
#[utoipa::path(
    get,
    path = "/api/dashboard/student",
    responses(
        (status = 200, description = "Student overview", body = StudentOverview),
        (status = 401, description = "No account for this session")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn student_dashboard(
    session: Session,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_student()?;
    let overview = student_overview(gateway.get_ref(), &session.email).await?;
    Ok(HttpResponse::Ok().json(overview))
}

/// Pages the signed-in role may open, with their tab metadata
#[utoipa::path(
    get,
    path = "/api/pages",
    responses((status = 200, description = "Navigable pages", body = [PageEntry])),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn pages(session: Session) -> HttpResponse {
    let entries: Vec<PageEntry> = Page::iter()
        .filter(|p| p.required_role().is_none_or(|r| r == session.role))
        .map(|page| PageEntry {
            page,
            route: page.route().to_string(),
            meta: page.meta(),
        })
        .collect();
    HttpResponse::Ok().json(entries)
}
