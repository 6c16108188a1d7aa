//! Printable attendance report. Produces the data only; layout belongs to the client.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::attendance::Mark;
use crate::model::{Course, StudentRecord};

pub const REPORT_TITLE: &str = "Attendance Report";
pub const REPORT_FOOTER: &str = "Generated by Attendance Monitoring System";

const NO_STATUS: &str = "N/A";
const NO_TIME: &str = "--:--";

/// "Wednesday, 01/08/2025"
pub fn format_report_date(date: NaiveDate) -> String {
    date.format("%A, %m/%d/%Y").to_string()
}

/// Roster row on the attendance screen: the student and their mark for the day, if any.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SheetRow {
    pub student: StudentRecord,
    pub mark: Option<Mark>,
}

pub fn sheet_rows<'a>(
    students: impl IntoIterator<Item = &'a StudentRecord>,
    marks: &HashMap<u64, Mark>,
) -> Vec<SheetRow> {
    students
        .into_iter()
        .map(|s| SheetRow {
            student: s.clone(),
            mark: marks.get(&s.id).copied(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReportRow {
    pub name: String,
    pub course: Course,
    #[schema(example = "Wednesday, 01/08/2025")]
    pub date: String,
    #[schema(example = "Present")]
    pub status: String,
    #[schema(example = "08:31:05")]
    pub time: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceReport {
    pub title: String,
    /// Selected course, empty when the report covers every course.
    pub course: String,
    pub date: String,
    /// "Date: January 8, 2025 Time: 9:05 AM"
    pub generated: String,
    pub rows: Vec<ReportRow>,
    pub footer: String,
}

pub fn build_report<'a>(
    students: impl IntoIterator<Item = &'a StudentRecord>,
    marks: &HashMap<u64, Mark>,
    date: NaiveDate,
    course: Option<Course>,
    generated_at: NaiveDateTime,
) -> AttendanceReport {
    let date_text = format_report_date(date);
    let rows = students
        .into_iter()
        .filter(|s| course.is_none_or(|c| s.course() == c))
        .map(|s| {
            // a cleared mark prints the same as no mark at all
            let mark = marks.get(&s.id).filter(|m| !m.is_cleared());
            ReportRow {
                name: s.name().to_string(),
                course: s.course(),
                date: date_text.clone(),
                status: mark.map_or_else(|| NO_STATUS.to_string(), |m| m.status.to_string()),
                time: mark
                    .and_then(|m| m.time)
                    .map_or_else(|| NO_TIME.to_string(), |t| t.format("%H:%M:%S").to_string()),
            }
        })
        .collect();

    AttendanceReport {
        title: REPORT_TITLE.to_string(),
        course: course.map(|c| c.to_string()).unwrap_or_default(),
        date: date_text,
        generated: format!(
            "Date: {} Time: {}",
            generated_at.format("%B %-d, %Y"),
            generated_at.format("%-I:%M %p")
        ),
        rows,
        footer: REPORT_FOOTER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttendanceStatus, Gender, StudentProfile, YearLevel};
    use chrono::NaiveTime;

    fn student(id: u64, name: &str, course: Course) -> StudentRecord {
        StudentRecord {
            id,
            profile: StudentProfile {
                name: name.into(),
                student_id: 1000 + id,
                course,
                year: YearLevel::First,
                phone: "0917".into(),
                age: 18,
                gender: Gender::Male,
            },
        }
    }

    #[test]
    fn formats_weekday_and_padded_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        assert_eq!(format_report_date(date), "Wednesday, 01/08/2025");
    }

    #[test]
    fn missing_and_cleared_marks_print_placeholders() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let students = vec![
            student(1, "A", Course::Bsit),
            student(2, "B", Course::Bsit),
            student(3, "C", Course::Bsis),
            student(4, "D", Course::Bsit),
        ];
        let marks = HashMap::from([
            (
                1,
                Mark {
                    status: AttendanceStatus::Late,
                    time: NaiveTime::from_hms_opt(8, 5, 0),
                },
            ),
            (4, Mark::cleared()),
        ]);
        let at = date.and_hms_opt(15, 7, 0).unwrap();

        let report = build_report(&students, &marks, date, Some(Course::Bsit), at);

        let cells: Vec<_> = report
            .rows
            .iter()
            .map(|r| (r.name.as_str(), r.status.as_str(), r.time.as_str()))
            .collect();
        assert_eq!(
            cells,
            vec![("A", "Late", "08:05:00"), ("B", "N/A", "--:--"), ("D", "N/A", "--:--")]
        );
        assert_eq!(report.course, "BSIT");
        assert_eq!(report.generated, "Date: January 8, 2025 Time: 3:07 PM");
    }
}
