use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;

use super::{Filter, Gateway, Identity, OrderBy, Profile, Row, Table};
use crate::error::{GatewayError, GatewayResult};
use crate::model::Role;

/// Gateway operations, as recorded by [`MemoryGateway`] and targeted by its
/// scripted failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Authenticate,
    Register,
    ConfirmEmail,
    RequestPasswordReset,
    CompletePasswordReset,
    Query,
    Insert,
    Update,
    Upsert,
    Delete,
}

impl Operation {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Operation::Register
                | Operation::ConfirmEmail
                | Operation::CompletePasswordReset
                | Operation::Insert
                | Operation::Update
                | Operation::Upsert
                | Operation::Delete
        )
    }
}

struct Credential {
    user_id: u64,
    password: String,
    role: Role,
    confirmed: bool,
}

#[derive(Default)]
struct State {
    tables: HashMap<Table, Vec<Row>>,
    next_id: HashMap<Table, u64>,
    credentials: HashMap<String, Credential>,
    next_user_id: u64,
    reset_codes: HashMap<String, String>,
    issued_resets: u64,
    confirmation_codes: HashMap<String, String>,
    issued_confirmations: u64,
    failures: HashMap<Operation, VecDeque<GatewayError>>,
    calls: Vec<(Operation, Option<Table>)>,
}

impl State {
    fn enter(&mut self, op: Operation, table: Option<Table>) -> GatewayResult<()> {
        self.calls.push((op, table));
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(?op, error = %err, "memory gateway: scripted failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<Row> {
        self.tables.entry(table).or_default()
    }

    fn assign_id(&mut self, table: Table, row: &mut Row) {
        let next = self.next_id.entry(table).or_insert(1);
        match row.get("id").and_then(Value::as_u64) {
            Some(id) => *next = (*next).max(id + 1),
            None => {
                row.insert("id".to_string(), Value::from(*next));
                *next += 1;
            }
        }
    }

    fn find_conflict(&self, table: Table, row: &Row) -> Option<usize> {
        let key = table.conflict_key();
        if key.iter().any(|c| !row.contains_key(*c)) {
            return None;
        }
        self.tables.get(&table)?.iter().position(|existing| {
            key.iter().all(|c| existing.get(*c) == row.get(*c))
        })
    }

    fn insert(&mut self, table: Table, mut row: Row) -> GatewayResult<()> {
        validate_columns(table, &row)?;
        if self.find_conflict(table, &row).is_some() {
            return Err(GatewayError::Constraint(format!(
                "duplicate key on {} ({})",
                table,
                table.conflict_key().join(", ")
            )));
        }
        self.assign_id(table, &mut row);
        self.rows_mut(table).push(row);
        Ok(())
    }
}

/// In-process stand-in for the hosted backend. Clones share state, so a test
/// can hand one clone to the code under test and inspect another.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert rows directly, bypassing call recording and failure scripts.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.lock();
        for row in rows {
            state
                .insert(table, row)
                .expect("seed rows must satisfy the table constraints");
        }
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    /// The next call of `op` fails with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: Operation, err: GatewayError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    pub fn fail_times(&self, op: Operation, times: usize, err: impl Fn() -> GatewayError) {
        let mut state = self.lock();
        let queue = state.failures.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(err());
        }
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(|(op, _)| *op).collect()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|(op, _)| op.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Register a credential directly. Returns the new user id.
    pub fn add_credential(&self, email: &str, password: &str, role: Role, confirmed: bool) -> u64 {
        let mut state = self.lock();
        state.next_user_id += 1;
        let user_id = state.next_user_id;
        state.credentials.insert(
            email.to_lowercase(),
            Credential {
                user_id,
                password: password.to_string(),
                role,
                confirmed,
            },
        );
        user_id
    }

    /// The outstanding confirmation code for `email`, as mailed at sign-up.
    pub fn confirmation_code(&self, email: &str) -> Option<String> {
        self.lock().confirmation_codes.get(&email.to_lowercase()).cloned()
    }

    /// The outstanding reset code for `email`, as the user would receive it by mail.
    pub fn reset_code(&self, email: &str) -> Option<String> {
        self.lock().reset_codes.get(&email.to_lowercase()).cloned()
    }
}

fn validate_columns(table: Table, row: &Row) -> GatewayResult<()> {
    for key in row.keys() {
        table.column(key)?;
    }
    Ok(())
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

impl Gateway for MemoryGateway {
    async fn authenticate(&self, email: &str, password: &str) -> GatewayResult<Identity> {
        let mut state = self.lock();
        state.enter(Operation::Authenticate, None)?;
        let email = email.to_lowercase();
        match state.credentials.get(&email) {
            Some(c) if c.password == password => Ok(Identity {
                user_id: c.user_id,
                email,
                email_confirmed: c.confirmed,
                role: Some(c.role),
            }),
            _ => Err(GatewayError::InvalidCredentials),
        }
    }

    async fn register(&self, email: &str, password: &str, profile: &Profile) -> GatewayResult<u64> {
        {
            let mut state = self.lock();
            state.enter(Operation::Register, None)?;
            if state.credentials.contains_key(&email.to_lowercase()) {
                return Err(GatewayError::DuplicateEmail);
            }
        }
        if password.len() < 6 {
            return Err(GatewayError::Validation(
                "Password should be at least 6 characters.".to_string(),
            ));
        }
        let user_id = self.add_credential(email, password, profile.role, false);
        let mut state = self.lock();
        state.issued_confirmations += 1;
        let code = format!("{:06}", 200_000 + state.issued_confirmations);
        state.confirmation_codes.insert(email.to_lowercase(), code);
        Ok(user_id)
    }

    async fn confirm_email(&self, email: &str, code: &str) -> GatewayResult<()> {
        let mut state = self.lock();
        state.enter(Operation::ConfirmEmail, None)?;
        let email = email.to_lowercase();
        if state.confirmation_codes.get(&email).map(String::as_str) != Some(code) {
            return Err(GatewayError::InvalidConfirmationCode);
        }
        state.confirmation_codes.remove(&email);
        let credential = state
            .credentials
            .get_mut(&email)
            .ok_or(GatewayError::UnknownEmail)?;
        credential.confirmed = true;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> GatewayResult<()> {
        let mut state = self.lock();
        state.enter(Operation::RequestPasswordReset, None)?;
        let email = email.to_lowercase();
        if !state.credentials.contains_key(&email) {
            return Err(GatewayError::UnknownEmail);
        }
        state.issued_resets += 1;
        let code = format!("{:06}", 100_000 + state.issued_resets);
        state.reset_codes.insert(email, code);
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> GatewayResult<()> {
        let mut state = self.lock();
        state.enter(Operation::CompletePasswordReset, None)?;
        let email = email.to_lowercase();
        if state.reset_codes.get(&email).map(String::as_str) != Some(code) {
            return Err(GatewayError::InvalidResetCode);
        }
        state.reset_codes.remove(&email);
        let credential = state
            .credentials
            .get_mut(&email)
            .ok_or(GatewayError::UnknownEmail)?;
        credential.password = new_password.to_string();
        Ok(())
    }

    async fn query_rows(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<OrderBy>,
    ) -> GatewayResult<Vec<Row>> {
        let mut state = self.lock();
        state.enter(Operation::Query, Some(table))?;
        for f in filters {
            table.column(f.column)?;
        }
        let mut rows: Vec<Row> = state
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| matches_all(r, filters)).cloned().collect())
            .unwrap_or_default();
        if let Some(order) = order {
            table.column(order.column)?;
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(order.column), b.get(order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        Ok(rows)
    }

    async fn insert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()> {
        let mut state = self.lock();
        state.enter(Operation::Insert, Some(table))?;
        // all-or-nothing, like a transaction
        let snapshot = state.tables.get(&table).cloned();
        for row in rows {
            if let Err(e) = state.insert(table, row) {
                match snapshot {
                    Some(previous) => state.tables.insert(table, previous),
                    None => state.tables.remove(&table),
                };
                return Err(e);
            }
        }
        Ok(())
    }

    async fn update_rows(&self, table: Table, patch: Row, filters: &[Filter]) -> GatewayResult<u64> {
        let mut state = self.lock();
        state.enter(Operation::Update, Some(table))?;
        validate_columns(table, &patch)?;
        let mut affected = 0;
        for row in state.rows_mut(table).iter_mut() {
            if matches_all(row, filters) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn upsert_rows(&self, table: Table, rows: Vec<Row>) -> GatewayResult<()> {
        let mut state = self.lock();
        state.enter(Operation::Upsert, Some(table))?;
        for row in rows {
            validate_columns(table, &row)?;
            match state.find_conflict(table, &row) {
                Some(idx) => {
                    let existing = &mut state.rows_mut(table)[idx];
                    for (k, v) in row {
                        if k != "id" {
                            existing.insert(k, v);
                        }
                    }
                }
                None => state.insert(table, row)?,
            }
        }
        Ok(())
    }

    async fn delete_rows(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        let mut state = self.lock();
        state.enter(Operation::Delete, Some(table))?;
        let rows = state.rows_mut(table);
        let before = rows.len();
        rows.retain(|r| !matches_all(r, filters));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::to_row;
    use serde_json::json;

    fn row(value: Value) -> Row {
        to_row(&value).unwrap()
    }

    #[actix_web::test]
    async fn upsert_replaces_on_the_conflict_key() {
        let gw = MemoryGateway::new();
        let first = row(json!({"student_id": 1, "date": "2025-01-08", "status": "Present", "time": "08:00:00"}));
        let second = row(json!({"student_id": 1, "date": "2025-01-08", "status": "Late", "time": "08:20:00"}));
        gw.upsert_rows(Table::Attendance, vec![first]).await.unwrap();
        gw.upsert_rows(Table::Attendance, vec![second]).await.unwrap();

        let rows = gw.rows(Table::Attendance);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], json!("Late"));
        assert_eq!(rows[0]["id"], json!(1));
    }

    #[actix_web::test]
    async fn insert_enforces_uniqueness_and_rolls_back() {
        let gw = MemoryGateway::new();
        let a = row(json!({"email": "a@x.io", "fullname": "A", "role": "teacher"}));
        let dup = a.clone();
        let b = row(json!({"email": "b@x.io", "fullname": "B", "role": "student"}));
        gw.insert_rows(Table::Accounts, vec![a]).await.unwrap();

        let err = gw.insert_rows(Table::Accounts, vec![b, dup]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Constraint(_)));
        assert_eq!(gw.rows(Table::Accounts).len(), 1);
    }

    #[actix_web::test]
    async fn scripted_failures_are_consumed_in_order() {
        let gw = MemoryGateway::new();
        gw.fail_next(Operation::Query, GatewayError::RateLimited);

        let first = gw.query_rows(Table::Users, &[], None).await;
        let second = gw.query_rows(Table::Users, &[], None).await;
        assert!(matches!(first, Err(GatewayError::RateLimited)));
        assert!(second.unwrap().is_empty());
        assert_eq!(gw.call_count(Operation::Query), 2);
    }

    #[actix_web::test]
    async fn query_orders_numerically() {
        let gw = MemoryGateway::new();
        gw.seed(
            Table::Users,
            [row(json!({"id": 10, "name": "J"})), row(json!({"id": 2, "name": "B"}))],
        );
        let rows = gw
            .query_rows(Table::Users, &[], Some(OrderBy::asc("id")))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(10)]);
    }
}
