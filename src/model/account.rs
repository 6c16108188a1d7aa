use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Role;

/// Row of the `accounts` table, written once at sign-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountRecord {
    #[schema(example = "juan@school.edu")]
    pub email: String,
    #[schema(example = "Juan Dela Cruz")]
    pub fullname: String,
    pub role: Role,
}
