use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScheduleEntry {
    pub student_email: String,
    #[schema(example = "Monday")]
    pub day: String,
    #[schema(example = "8:00 AM - 10:00 AM")]
    pub time: String,
    #[schema(example = "Data Structures")]
    pub subject: String,
}
