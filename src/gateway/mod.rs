//! Contract of the hosted backend: credential auth plus row CRUD over a fixed
//! set of tables, queried with equality filters only.

pub mod memory;
pub mod mysql;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::error::{GatewayError, GatewayResult};
use crate::model::Role;

pub use memory::MemoryGateway;
pub use mysql::MySqlGateway;

/// One table row as a JSON object keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Accounts,
    Users,
    Attendance,
    Absences,
    Schedules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Id,
    Int,
    Text,
    Date,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column { name, kind }
}

const ACCOUNTS: &[Column] = &[
    col("id", ColumnKind::Id),
    col("email", ColumnKind::Text),
    col("fullname", ColumnKind::Text),
    col("role", ColumnKind::Text),
];

const USERS: &[Column] = &[
    col("id", ColumnKind::Id),
    col("name", ColumnKind::Text),
    col("student_id", ColumnKind::Int),
    col("course", ColumnKind::Text),
    col("year", ColumnKind::Text),
    col("number", ColumnKind::Text),
    col("age", ColumnKind::Int),
    col("gender", ColumnKind::Text),
];

const ATTENDANCE: &[Column] = &[
    col("id", ColumnKind::Id),
    col("student_id", ColumnKind::Int),
    col("date", ColumnKind::Date),
    col("status", ColumnKind::Text),
    col("time", ColumnKind::Time),
];

const ABSENCES: &[Column] = &[
    col("id", ColumnKind::Id),
    col("student_email", ColumnKind::Text),
    col("date", ColumnKind::Date),
    col("reason", ColumnKind::Text),
];

const SCHEDULES: &[Column] = &[
    col("id", ColumnKind::Id),
    col("student_email", ColumnKind::Text),
    col("day", ColumnKind::Text),
    col("time", ColumnKind::Text),
    col("subject", ColumnKind::Text),
];

impl Table {
    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Accounts => ACCOUNTS,
            Table::Users => USERS,
            Table::Attendance => ATTENDANCE,
            Table::Absences => ABSENCES,
            Table::Schedules => SCHEDULES,
        }
    }

    pub fn column(self, name: &str) -> GatewayResult<Column> {
        self.columns()
            .iter()
            .copied()
            .find(|c| c.name == name)
            .ok_or_else(|| GatewayError::Validation(format!("unknown column {}.{}", self, name)))
    }

    /// Columns of the uniqueness constraint an upsert resolves conflicts on.
    pub fn conflict_key(self) -> &'static [&'static str] {
        match self {
            Table::Accounts => &["email"],
            Table::Attendance => &["student_id", "date"],
            Table::Users | Table::Absences | Table::Schedules => &["id"],
        }
    }
}

/// Equality filter: `column = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Serialize) -> GatewayResult<Self> {
        Ok(Self {
            column,
            value: serde_json::to_value(value)?,
        })
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(self.column).is_some_and(|v| v == &self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            ascending: true,
        }
    }
}

/// What the identity provider knows about a signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: u64,
    pub email: String,
    pub email_confirmed: bool,
    pub role: Option<Role>,
}

/// Metadata attached to a new credential at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub fullname: String,
    pub role: Role,
    pub student_number: Option<String>,
}

/// The hosted backend. Implementations are the system of record; everything
/// the core caches is rebuilt from here.
#[allow(async_fn_in_trait)]
pub trait Gateway {
    async fn authenticate(&self, email: &str, password: &str) -> GatewayResult<Identity>;

    /// Creates an unconfirmed credential and issues the confirmation code that
    /// is mailed to `email`.
    async fn register(&self, email: &str, password: &str, profile: &Profile) -> GatewayResult<u64>;

    /// Marks the credential confirmed if `code` is the one issued for `email`.
    async fn confirm_email(&self, email: &str, code: &str) -> GatewayResult<()>;

    async fn request_password_reset(&self, email: &str) -> GatewayResult<()>;

    async fn complete_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> GatewayResult<()>;

    async fn query_rows(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> GatewayResult<Vec<Row>>;

    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()>;

    /// Returns the number of rows the patch landed on.
    async fn update_rows(&self, table: Table, patch: Row, filters: &[Filter]) -> GatewayResult<u64>;

    async fn upsert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()>;

    async fn delete_rows(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64>;
}

pub fn to_row<T: Serialize>(value: &T) -> GatewayResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(GatewayError::Validation(format!(
            "expected an object row, got {}",
            other
        ))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> GatewayResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> GatewayResult<Vec<T>> {
    rows.into_iter().map(from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn table_names_match_the_backend() {
        assert_eq!(Table::Attendance.to_string(), "attendance");
        assert_eq!(Table::from_str("schedules").unwrap(), Table::Schedules);
    }

    #[test]
    fn unknown_columns_are_rejected() {
        assert!(Table::Users.column("name").is_ok());
        assert!(matches!(
            Table::Users.column("name; DROP TABLE users"),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn filters_compare_serialized_values() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
        let filter = Filter::eq("date", date).unwrap();
        let row = to_row(&json!({"student_id": 1, "date": "2025-01-08"})).unwrap();
        assert!(filter.matches(&row));
        assert!(!Filter::eq("student_id", 2u64).unwrap().matches(&row));
    }
}
