use std::num::NonZeroU32;
use std::sync::Arc;

use actix_governor::governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlPool};
use sqlx::query::{Query, QueryScalar};
use sqlx::{FromRow, MySql};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{ColumnKind, Filter, Gateway, Identity, OrderBy, Profile, Row, Table};
use crate::auth::password::{hash_password, verify_password};
use crate::error::{GatewayError, GatewayResult};
use crate::model::Role;

/// SQL bindable value
#[derive(Debug, Clone, PartialEq)]
enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Date(NaiveDate),
    Time(NaiveTime),
    Null,
}

/// Convert a JSON cell into a bindable value, using the column's declared kind.
fn to_sql_value(table: Table, column: &str, value: &Value) -> GatewayResult<SqlValue> {
    let kind = table.column(column)?.kind;
    let bad = || GatewayError::Validation(format!("invalid value for {}.{}: {}", table, column, value));

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match kind {
        ColumnKind::Id | ColumnKind::Int => match value {
            Value::Number(n) => n
                .as_u64()
                .map(SqlValue::U64)
                .or_else(|| n.as_i64().map(SqlValue::I64))
                .ok_or_else(bad),
            Value::String(s) => s.trim().parse().map(SqlValue::U64).map_err(|_| bad()),
            _ => Err(bad()),
        },
        ColumnKind::Text => match value {
            Value::String(s) => Ok(SqlValue::String(s.clone())),
            Value::Number(n) => Ok(SqlValue::String(n.to_string())),
            _ => Err(bad()),
        },
        ColumnKind::Date => value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(SqlValue::Date)
            .ok_or_else(bad),
        ColumnKind::Time => value
            .as_str()
            .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok())
            .map(SqlValue::Time)
            .ok_or_else(bad),
    }
}

/// SQL text plus the values for its placeholders, in order.
#[derive(Debug)]
struct SqlStatement {
    sql: String,
    values: Vec<SqlValue>,
}

fn where_clause(table: Table, filters: &[Filter], values: &mut Vec<SqlValue>) -> GatewayResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut conditions = Vec::with_capacity(filters.len());
    for f in filters {
        let column = table.column(f.column)?;
        conditions.push(format!("{} = ?", column.name));
        values.push(to_sql_value(table, column.name, &f.value)?);
    }
    Ok(format!(" WHERE {}", conditions.join(" AND ")))
}

fn build_select(table: Table, filters: &[Filter], order: Option<OrderBy>) -> GatewayResult<SqlStatement> {
    // every row comes back as one JSON object so callers get a uniform Row
    let fields = table
        .columns()
        .iter()
        .map(|c| format!("'{0}', {0}", c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut values = Vec::new();
    let mut sql = format!("SELECT CAST(JSON_OBJECT({}) AS CHAR) FROM {}", fields, table);
    sql.push_str(&where_clause(table, filters, &mut values)?);
    if let Some(order) = order {
        let column = table.column(order.column)?;
        let direction = if order.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(" ORDER BY {} {}", column.name, direction));
    }
    Ok(SqlStatement { sql, values })
}

fn build_insert(table: Table, row: &Row, upsert: bool) -> GatewayResult<SqlStatement> {
    if row.is_empty() {
        return Err(GatewayError::Validation("No fields provided for insert".into()));
    }
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (key, value) in row {
        let column = table.column(key)?;
        columns.push(column.name);
        values.push(to_sql_value(table, column.name, value)?);
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );

    if upsert {
        let key = table.conflict_key();
        let assignments = columns
            .iter()
            .filter(|c| !key.contains(*c) && **c != "id")
            .map(|c| format!("{0} = VALUES({0})", c))
            .collect::<Vec<_>>();
        // a row made only of key columns still needs a no-op assignment
        let assignments = if assignments.is_empty() {
            format!("{0} = {0}", key[0])
        } else {
            assignments.join(", ")
        };
        sql.push_str(&format!(" ON DUPLICATE KEY UPDATE {}", assignments));
    }
    Ok(SqlStatement { sql, values })
}

fn build_update(table: Table, patch: &Row, filters: &[Filter]) -> GatewayResult<SqlStatement> {
    if patch.is_empty() {
        return Err(GatewayError::Validation("No fields provided for update".into()));
    }
    let mut values = Vec::with_capacity(patch.len() + filters.len());
    let mut assignments = Vec::with_capacity(patch.len());
    for (key, value) in patch {
        let column = table.column(key)?;
        assignments.push(format!("{} = ?", column.name));
        values.push(to_sql_value(table, column.name, value)?);
    }
    let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
    sql.push_str(&where_clause(table, filters, &mut values)?);
    Ok(SqlStatement { sql, values })
}

fn build_delete(table: Table, filters: &[Filter]) -> GatewayResult<SqlStatement> {
    if filters.is_empty() {
        return Err(GatewayError::Validation("Refusing to delete without a filter".into()));
    }
    let mut values = Vec::with_capacity(filters.len());
    let mut sql = format!("DELETE FROM {}", table);
    sql.push_str(&where_clause(table, filters, &mut values)?);
    Ok(SqlStatement { sql, values })
}

fn bind_all(
    mut query: Query<'_, MySql, MySqlArguments>,
    values: Vec<SqlValue>,
) -> Query<'_, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn bind_all_scalar(
    mut query: QueryScalar<'_, MySql, String, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryScalar<'_, MySql, String, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Time(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Duplicate-key errors surface as constraint violations.
fn map_db_error(e: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23000") {
            return GatewayError::Constraint(db_err.message().to_string());
        }
    }
    match e {
        sqlx::Error::RowNotFound => GatewayError::NotFound,
        other => GatewayError::Database(other),
    }
}

#[derive(FromRow)]
struct CredentialSql {
    id: u64,
    password_hash: String,
    role: String,
    email_confirmed_at: Option<NaiveDateTime>,
}

/// Gateway backed by MySQL. Credentials live in `credentials` and
/// `password_resets`; auth calls share a rate limit and fail with
/// [`GatewayError::RateLimited`] once it is spent.
#[derive(Clone)]
pub struct MySqlGateway {
    pool: MySqlPool,
    auth_limiter: Arc<DefaultDirectRateLimiter>,
}

impl MySqlGateway {
    pub fn new(pool: MySqlPool, auth_per_min: u32) -> Self {
        let per_min = NonZeroU32::new(auth_per_min).unwrap_or(NonZeroU32::MIN);
        Self {
            pool,
            auth_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_min))),
        }
    }

    pub async fn connect(database_url: &str, auth_per_min: u32) -> Result<Self, sqlx::Error> {
        let pool = MySqlPool::connect(database_url).await?;
        Ok(Self::new(pool, auth_per_min))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn check_auth_quota(&self) -> GatewayResult<()> {
        self.auth_limiter.check().map_err(|_| {
            warn!("auth rate limit exceeded");
            GatewayError::RateLimited
        })
    }

    async fn execute(&self, statement: SqlStatement) -> GatewayResult<u64> {
        debug!(sql = %statement.sql, values = ?statement.values, "executing");
        let query = bind_all(sqlx::query(&statement.sql), statement.values);
        let result = query.execute(&self.pool).await.map_err(map_db_error)?;
        Ok(result.rows_affected())
    }

    async fn find_credential(&self, email: &str) -> GatewayResult<Option<CredentialSql>> {
        sqlx::query_as::<_, CredentialSql>(
            r#"
            SELECT id, password_hash, role, email_confirmed_at
            FROM credentials
            WHERE email = ?
            "#,
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }
}

/// Six-digit code for reset and confirmation mails.
fn new_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

impl Gateway for MySqlGateway {
    #[instrument(name = "gateway_authenticate", skip(self, password))]
    async fn authenticate(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        self.check_auth_quota()?;

        let credential = match self.find_credential(email).await? {
            Some(c) => c,
            None => {
                info!("Invalid credentials: email not found");
                return Err(GatewayError::InvalidCredentials);
            }
        };

        if let Err(e) = verify_password(password, &credential.password_hash) {
            info!(error = %e, "Invalid credentials: password mismatch");
            return Err(GatewayError::InvalidCredentials);
        }

        if let Err(e) = sqlx::query("UPDATE credentials SET last_sign_in_at = NOW() WHERE id = ?")
            .bind(credential.id)
            .execute(&self.pool)
            .await
        {
            // not fatal to the sign-in
            error!(error = %e, "Failed to update last_sign_in_at");
        }

        Ok(Identity {
            user_id: credential.id,
            email: email.to_lowercase(),
            email_confirmed: credential.email_confirmed_at.is_some(),
            role: credential.role.parse::<Role>().ok(),
        })
    }

    #[instrument(name = "gateway_register", skip(self, password, profile), fields(role = %profile.role))]
    async fn register(&self, email: &str, password: &str, profile: &Profile) -> GatewayResult<u64> {
        self.check_auth_quota()?;

        if password.len() < 6 {
            return Err(GatewayError::Validation(
                "Password should be at least 6 characters.".to_string(),
            ));
        }

        let hashed = hash_password(password).map_err(|e| {
            error!(error = %e, "Failed to hash password");
            GatewayError::Validation("Password could not be processed".to_string())
        })?;

        let email = email.to_lowercase();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO credentials (email, password_hash, role, fullname, student_number)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&email)
        .bind(hashed)
        .bind(profile.role.as_ref())
        .bind(&profile.fullname)
        .bind(profile.student_number.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| match map_db_error(e) {
            GatewayError::Constraint(_) => GatewayError::DuplicateEmail,
            other => other,
        })?;

        // delivery is handled by the mail relay reading email_confirmations
        sqlx::query(
            r#"
            INSERT INTO email_confirmations (email, code, expires_at)
            VALUES (?, ?, NOW() + INTERVAL 24 HOUR)
            "#,
        )
        .bind(&email)
        .bind(new_code())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        info!(user_id = inserted.last_insert_id(), "Credential registered");
        Ok(inserted.last_insert_id())
    }

    #[instrument(name = "gateway_confirm_email", skip(self, code))]
    async fn confirm_email(&self, email: &str, code: &str) -> GatewayResult<()> {
        self.check_auth_quota()?;

        let email = email.to_lowercase();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let consumed = sqlx::query(
            r#"
            UPDATE email_confirmations
            SET used = TRUE
            WHERE email = ? AND code = ? AND used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(&email)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if consumed.rows_affected() == 0 {
            return Err(GatewayError::InvalidConfirmationCode);
        }

        sqlx::query(
            "UPDATE credentials SET email_confirmed_at = NOW() WHERE email = ? AND email_confirmed_at IS NULL",
        )
        .bind(&email)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        info!("Email confirmed");
        Ok(())
    }

    #[instrument(name = "gateway_request_password_reset", skip(self))]
    async fn request_password_reset(&self, email: &str) -> GatewayResult<()> {
        self.check_auth_quota()?;

        if self.find_credential(email).await?.is_none() {
            return Err(GatewayError::UnknownEmail);
        }

        let code = new_code();
        sqlx::query(
            r#"
            INSERT INTO password_resets (email, code, expires_at)
            VALUES (?, ?, NOW() + INTERVAL 1 HOUR)
            "#,
        )
        .bind(email.to_lowercase())
        .bind(&code)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        // delivery is handled by the mail relay reading password_resets
        info!("Password reset code issued");
        Ok(())
    }

    #[instrument(name = "gateway_complete_password_reset", skip(self, code, new_password))]
    async fn complete_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> GatewayResult<()> {
        self.check_auth_quota()?;

        let email = email.to_lowercase();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let consumed = sqlx::query(
            r#"
            UPDATE password_resets
            SET used = TRUE
            WHERE email = ? AND code = ? AND used = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(&email)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        if consumed.rows_affected() == 0 {
            return Err(GatewayError::InvalidResetCode);
        }

        let hashed = hash_password(new_password).map_err(|e| {
            error!(error = %e, "Failed to hash password");
            GatewayError::Validation("Password could not be processed".to_string())
        })?;

        sqlx::query("UPDATE credentials SET password_hash = ? WHERE email = ?")
            .bind(hashed)
            .bind(&email)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        info!("Password reset completed");
        Ok(())
    }

    async fn query_rows(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> GatewayResult<Vec<Row>> {
        let statement = build_select(table, filters, order)?;
        debug!(sql = %statement.sql, values = ?statement.values, "querying");

        let query = bind_all_scalar(sqlx::query_scalar::<_, String>(&statement.sql), statement.values);
        let mut stream = query.fetch(&self.pool);
        let mut rows = Vec::new();
        while let Some(text) = stream.try_next().await.map_err(map_db_error)? {
            match serde_json::from_str::<Value>(&text)? {
                Value::Object(map) => rows.push(map),
                other => {
                    return Err(GatewayError::Validation(format!(
                        "expected an object row from {}, got {}",
                        table, other
                    )));
                }
            }
        }
        Ok(rows)
    }

    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for row in &rows {
            let statement = build_insert(table, row, false)?;
            debug!(sql = %statement.sql, "inserting");
            bind_all(sqlx::query(&statement.sql), statement.values)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)
    }

    async fn update_rows(&self, table: Table, patch: Row, filters: &[Filter]) -> GatewayResult<u64> {
        self.execute(build_update(table, &patch, filters)?).await
    }

    async fn upsert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        for row in &rows {
            let statement = build_insert(table, row, true)?;
            debug!(sql = %statement.sql, "upserting");
            bind_all(sqlx::query(&statement.sql), statement.values)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }
        tx.commit().await.map_err(map_db_error)
    }

    async fn delete_rows(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        self.execute(build_delete(table, filters)?).await
    }
}
