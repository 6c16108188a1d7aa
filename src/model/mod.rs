pub mod absence;
pub mod account;
pub mod attendance;
pub mod role;
pub mod schedule;
pub mod student;

pub use absence::AbsenceRecord;
pub use account::AccountRecord;
pub use attendance::{AttendanceRecord, AttendanceStatus};
pub use role::Role;
pub use schedule::ScheduleEntry;
pub use student::{Course, Gender, StudentProfile, StudentRecord, YearLevel};
