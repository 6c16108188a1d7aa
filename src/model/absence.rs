use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AbsenceRecord {
    pub student_email: String,
    #[schema(example = "2025-01-08", format = "date", value_type = String)]
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}
