use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

use crate::auth::Session;
use crate::error::AppResult;
use crate::gateway::MySqlGateway;
use crate::model::{Course, StudentRecord};
use crate::roster::{Roster, StudentForm};

#[derive(Debug, Deserialize, IntoParams)]
pub struct StudentQuery {
    /// Case-insensitive name search
    pub search: Option<String>,
    pub course: Option<Course>,
}

async fn load(gateway: &web::Data<MySqlGateway>) -> AppResult<Roster<MySqlGateway>> {
    Roster::load(gateway.get_ref().clone()).await
}

/// List students
#[utoipa::path(
    get,
    path = "/api/students",
    params(StudentQuery),
    responses(
        (status = 200, description = "Students ordered by id", body = [StudentRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn list_students(
    session: Session,
    query: web::Query<StudentQuery>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let roster = load(&gateway).await?;
    let found: Vec<&StudentRecord> =
        roster.search(query.search.as_deref().unwrap_or_default(), query.course);
    Ok(HttpResponse::Ok().json(found))
}

/// Distinct courses on the roster
#[utoipa::path(
    get,
    path = "/api/students/courses",
    responses(
        (status = 200, description = "Courses in first-seen order", body = [Course]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn list_courses(
    session: Session,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let roster = load(&gateway).await?;
    Ok(HttpResponse::Ok().json(roster.courses()))
}

/// Add a student
#[utoipa::path(
    post,
    path = "/api/students",
    request_body = StudentForm,
    responses(
        (status = 201, description = "Student added; the refreshed roster, or a message if it could not be re-read", body = [StudentRecord]),
        (status = 400, description = "Validation failed", body = Object, example = json!({
            "message": "Please fill in all fields."
        })),
        (status = 409, description = "Duplicate name or student number", body = Object, example = json!({
            "message": "You entered the same name"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn create_student(
    session: Session,
    form: web::Json<StudentForm>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let mut roster = load(&gateway).await?;
    roster.create_user(&form).await?;
    if roster.is_stale() {
        // saved, but the list could not be read back
        return Ok(HttpResponse::Created().json(json!({ "message": "Student created successfully" })));
    }
    Ok(HttpResponse::Created().json(roster.students()))
}

/// Edit a student
#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id" = u64, Path, description = "Student row id")),
    request_body = StudentForm,
    responses(
        (status = 200, description = "Student updated", body = StudentRecord),
        (status = 400, description = "Validation failed or student not found"),
        (status = 409, description = "Duplicate name or student number")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn update_student(
    session: Session,
    path: web::Path<u64>,
    form: web::Json<StudentForm>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let mut roster = load(&gateway).await?;
    let updated = roster.update_user(path.into_inner(), &form).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Remove a student
#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id" = u64, Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student removed", body = Object, example = json!({
            "message": "Student deleted successfully"
        })),
        (status = 400, description = "Unknown student or last remaining student", body = Object, example = json!({
            "message": "Cannot delete the last user."
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn delete_student(
    session: Session,
    path: web::Path<u64>,
    gateway: web::Data<MySqlGateway>,
) -> AppResult<HttpResponse> {
    session.require_teacher()?;
    let mut roster = load(&gateway).await?;
    roster.delete_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Student deleted successfully" })))
}
