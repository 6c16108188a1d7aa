use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, Display,
    EnumString, AsRefStr, EnumIter, ToSchema,
)]
pub enum Course {
    #[serde(rename = "BSIT")]
    #[strum(serialize = "BSIT")]
    Bsit,
    #[serde(rename = "BSIS")]
    #[strum(serialize = "BSIS")]
    Bsis,
    #[serde(rename = "BSCPE")]
    #[strum(serialize = "BSCPE")]
    Bscpe,
}

/// Year level. Stored as "1st".."4th"; the older "1st Year" spelling is accepted on read.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, Display,
    EnumString, AsRefStr, EnumIter, ToSchema,
)]
pub enum YearLevel {
    #[serde(rename = "1st", alias = "1st Year")]
    #[strum(to_string = "1st", serialize = "1st Year")]
    First,
    #[serde(rename = "2nd", alias = "2nd Year")]
    #[strum(to_string = "2nd", serialize = "2nd Year")]
    Second,
    #[serde(rename = "3rd", alias = "3rd Year")]
    #[strum(to_string = "3rd", serialize = "3rd Year")]
    Third,
    #[serde(rename = "4th", alias = "4th Year")]
    #[strum(to_string = "4th", serialize = "4th Year")]
    Fourth,
}

impl YearLevel {
    pub fn number(self) -> u8 {
        match self {
            YearLevel::First => 1,
            YearLevel::Second => 2,
            YearLevel::Third => 3,
            YearLevel::Fourth => 4,
        }
    }
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, Display,
    EnumString, AsRefStr, EnumIter, ToSchema,
)]
pub enum Gender {
    Male,
    Female,
}

/// A validated student, before the backend has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentProfile {
    #[schema(example = "Juan Dela Cruz")]
    pub name: String,
    #[schema(example = 20231234)]
    pub student_id: u64,
    pub course: Course,
    pub year: YearLevel,
    /// Contact number, kept as text to preserve leading zeros.
    #[serde(rename = "number")]
    #[schema(example = "09171234567")]
    pub phone: String,
    #[schema(example = 19)]
    pub age: u32,
    pub gender: Gender,
}

/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[serde(flatten)]
    pub profile: StudentProfile,
}

impl StudentRecord {
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn course(&self) -> Course {
        self.profile.course
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn reads_legacy_year_spelling() {
        let year: YearLevel = serde_json::from_value(json!("3rd Year")).unwrap();
        assert_eq!(year, YearLevel::Third);
        assert_eq!(YearLevel::from_str("2nd Year").unwrap(), YearLevel::Second);
        assert_eq!(serde_json::to_value(YearLevel::Fourth).unwrap(), json!("4th"));
    }

    #[test]
    fn record_flattens_into_a_users_row() {
        let row = json!({
            "id": 7,
            "name": "Ana Santos",
            "student_id": 20230007,
            "course": "BSCPE",
            "year": "1st",
            "number": "09170000007",
            "age": 18,
            "gender": "Female"
        });
        let record: StudentRecord = serde_json::from_value(row.clone()).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.course(), Course::Bscpe);
        assert_eq!(record.profile.phone, "09170000007");
        assert_eq!(serde_json::to_value(&record).unwrap(), row);
    }
}
