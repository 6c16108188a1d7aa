//! View-facing state the client renders without re-deriving business rules.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::Role;

pub const TAB_ICON: &str = "bcp-logo.png";

/// At most one modal is rendered at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
    AsRefStr, ToSchema,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Modal {
    #[default]
    Closed,
    SignIn,
    SignUp,
    ForgotPassword,
    ResetCode,
    ResetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalAction {
    Open(Modal),
    Close,
    /// The current step's form was submitted successfully.
    Advance,
}

impl Modal {
    pub fn next(self, action: ModalAction) -> Modal {
        match action {
            ModalAction::Open(target) => target,
            ModalAction::Close => Modal::Closed,
            ModalAction::Advance => match self {
                Modal::ForgotPassword => Modal::ResetCode,
                Modal::ResetCode => Modal::ResetPassword,
                Modal::Closed
                | Modal::SignIn
                | Modal::SignUp
                | Modal::ResetPassword => Modal::Closed,
            },
        }
    }

    pub fn is_open(self) -> bool {
        self != Modal::Closed
    }
}

/// The student-number field is shown only while signing up as a student.
pub fn shows_student_number(role: Option<Role>) -> bool {
    role == Some(Role::Student)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Home,
    TeacherDashboard,
    StudentInformation,
    Attendance,
    StudentDashboard,
}

/// Tab title and icon, applied by the client on navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageMeta {
    pub title: String,
    pub icon: String,
}

impl Page {
    pub fn meta(self) -> PageMeta {
        let title = match self {
            Page::Home => "BCP-System",
            Page::TeacherDashboard => "Dashboard",
            Page::StudentInformation => "Student Information",
            Page::Attendance => "Attendance",
            Page::StudentDashboard => "Student Dashboard",
        };
        PageMeta {
            title: title.to_string(),
            icon: TAB_ICON.to_string(),
        }
    }

    pub fn route(self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::TeacherDashboard => "/teachers/dashboard",
            Page::StudentInformation => "/teachers/student-information",
            Page::Attendance => "/teachers/attendance",
            Page::StudentDashboard => "/students/dashboard",
        }
    }

    /// Role allowed to open the page; `None` for public pages.
    pub fn required_role(self) -> Option<Role> {
        match self {
            Page::Home => None,
            Page::StudentDashboard => Some(Role::Student),
            Page::TeacherDashboard | Page::StudentInformation | Page::Attendance => {
                Some(Role::Teacher)
            }
        }
    }

    /// Where a role lands after signing in.
    pub fn landing(role: Role) -> Page {
        match role {
            Role::Teacher => Page::TeacherDashboard,
            Role::Student => Page::StudentDashboard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn reset_flow_walks_through_its_steps() {
        let mut modal = Modal::Closed.next(ModalAction::Open(Modal::SignIn));
        modal = modal.next(ModalAction::Open(Modal::ForgotPassword));
        assert_eq!(modal, Modal::ForgotPassword);
        modal = modal.next(ModalAction::Advance);
        assert_eq!(modal, Modal::ResetCode);
        modal = modal.next(ModalAction::Advance);
        assert_eq!(modal, Modal::ResetPassword);
        modal = modal.next(ModalAction::Advance);
        assert!(!modal.is_open());
    }

    #[test]
    fn close_always_closes() {
        for start in [Modal::SignUp, Modal::ResetCode, Modal::Closed] {
            assert_eq!(start.next(ModalAction::Close), Modal::Closed);
        }
    }

    #[test]
    fn student_number_only_for_students() {
        assert!(shows_student_number(Some(Role::Student)));
        assert!(!shows_student_number(Some(Role::Teacher)));
        assert!(!shows_student_number(None));
    }

    #[test]
    fn every_page_carries_the_school_icon() {
        for page in Page::iter() {
            assert_eq!(page.meta().icon, TAB_ICON);
            assert!(page.route().starts_with('/'));
        }
        assert_eq!(Page::landing(Role::Teacher).route(), "/teachers/dashboard");
        assert_eq!(Page::landing(Role::Student).route(), "/students/dashboard");
    }
}
