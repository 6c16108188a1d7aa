use crate::api::attendance::{SetStatusReq, SheetResponse};
use crate::api::auth::{
    ConfirmEmailReq, ForgotPasswordReq, ForgotPasswordResponse, ResetPasswordReq, SignInResponse,
};
use crate::api::dashboard::PageEntry;
use crate::attendance::Mark;
use crate::auth::flows::{AuthOutcome, SignInForm, SignUpForm};
use crate::dashboard::{DashboardSummary, Slice, StudentOverview};
use crate::model::{
    AbsenceRecord, AccountRecord, AttendanceStatus, Course, Gender, Role, ScheduleEntry,
    StudentProfile, StudentRecord, YearLevel,
};
use crate::report::{AttendanceReport, ReportRow, SheetRow};
use crate::roster::StudentForm;
use crate::view::{Page, PageMeta};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Tracker API",
        version = "0.1.0",
        description = r#"
## Student Attendance Tracker

Backend for a school attendance system used by teachers and students.

### Features
- **Student Information**: add, edit, remove and search students
- **Attendance**: one status per student per day, printable reports
- **Dashboards**: roster breakdown for teachers, absences and schedule for students
- **Accounts**: sign-in by role, sign-up, password reset by mailed code

### Security
Everything under `/api` needs a **JWT Bearer** token from `/auth/signin`.
"#,
    ),
    paths(
        crate::api::auth::sign_in,
        crate::api::auth::sign_up,
        crate::api::auth::confirm_email,
        crate::api::auth::email_available,
        crate::api::auth::forgot_password,
        crate::api::auth::reset_password,
        crate::api::auth::sign_out,

        crate::api::students::list_students,
        crate::api::students::list_courses,
        crate::api::students::create_student,
        crate::api::students::update_student,
        crate::api::students::delete_student,

        crate::api::attendance::get_sheet,
        crate::api::attendance::set_status,
        crate::api::attendance::clear_status,
        crate::api::attendance::report,

        crate::api::dashboard::teacher_dashboard,
        crate::api::dashboard::student_dashboard,
        crate::api::dashboard::pages
    ),
    components(
        schemas(
            SignInForm,
            SignUpForm,
            AuthOutcome,
            SignInResponse,
            ConfirmEmailReq,
            ForgotPasswordReq,
            ForgotPasswordResponse,
            ResetPasswordReq,
            StudentForm,
            StudentProfile,
            StudentRecord,
            Course,
            YearLevel,
            Gender,
            Role,
            AttendanceStatus,
            Mark,
            SetStatusReq,
            SheetRow,
            SheetResponse,
            ReportRow,
            AttendanceReport,
            Slice,
            DashboardSummary,
            AccountRecord,
            AbsenceRecord,
            ScheduleEntry,
            StudentOverview,
            Page,
            PageMeta,
            PageEntry
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign-in, sign-up, email confirmation and password reset"),
        (name = "Students", description = "Student information management"),
        (name = "Attendance", description = "Daily attendance and reports"),
        (name = "Dashboard", description = "Teacher and student dashboards"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
