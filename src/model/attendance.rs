use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Status of one student on one day. `Cleared` is the empty status left behind
/// when a teacher clears a mark; the row itself is kept.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    #[serde(rename = "")]
    #[strum(serialize = "")]
    Cleared,
}

/// Row of the `attendance` table. At most one exists per (`student_id`, `date`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub student_id: u64,
    #[schema(example = "2025-01-08", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[schema(example = "08:30:00", value_type = Option<String>)]
    pub time: Option<NaiveTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn cleared_status_is_the_empty_string() {
        assert_eq!(serde_json::to_value(AttendanceStatus::Cleared).unwrap(), json!(""));
        assert_eq!(AttendanceStatus::from_str("").unwrap(), AttendanceStatus::Cleared);
        assert!(AttendanceStatus::from_str("Select").is_err());
    }

    #[test]
    fn accepts_fractional_seconds_from_the_database() {
        let record: AttendanceRecord = serde_json::from_value(json!({
            "id": 3,
            "student_id": 1,
            "date": "2025-01-08",
            "status": "Late",
            "time": "08:31:05.000000"
        }))
        .unwrap();
        assert_eq!(record.time, NaiveTime::from_hms_opt(8, 31, 5));
        assert_eq!(record.status, AttendanceStatus::Late);
    }
}
