//! Shared test support: a scripted in-memory driver and the PERSON test
//! entity. The driver records every statement it receives and answers
//! scalar/query calls from scripted rules, so tests can assert the exact
//! SQL the mapper emits without a live server.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustormdb::core::{Result, Value};
use rustormdb::{
    Database, DbConfig, DbError, Dialect, Driver, DriverConnection, DriverRows, EntityCore,
    FieldDesc, FieldRole, HostType, Persistent, TypeDesc, TypeDescBuilder,
};

// ----------------------------------------------------------------------
// Scripted driver
// ----------------------------------------------------------------------

pub type QueryRows = (Vec<String>, Vec<Vec<Value>>);

#[derive(Default)]
pub struct MockState {
    /// Every statement in arrival order: (kind, sql, params).
    pub statements: Vec<(&'static str, String, Vec<(String, Value)>)>,
    scalar_once: VecDeque<(String, Value)>,
    scalar_always: Vec<(String, Value)>,
    query_once: VecDeque<(String, QueryRows)>,
    query_always: Vec<(String, QueryRows)>,
    pub affected: u64,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub fail_commit: bool,
}

impl MockState {
    /// One-shot scalar response for the next statement containing `needle`.
    pub fn push_scalar(&mut self, needle: &str, value: Value) {
        self.scalar_once.push_back((needle.to_string(), value));
    }

    /// Persistent scalar response for statements containing `needle`.
    pub fn scalar_always(&mut self, needle: &str, value: Value) {
        self.scalar_always.push((needle.to_string(), value));
    }

    pub fn push_query(&mut self, needle: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.query_once.push_back((
            needle.to_string(),
            (columns.iter().map(|c| c.to_string()).collect(), rows),
        ));
    }

    pub fn query_always(&mut self, needle: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.query_always.push((
            needle.to_string(),
            (columns.iter().map(|c| c.to_string()).collect(), rows),
        ));
    }

    pub fn executed_sql(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|(kind, _, _)| *kind == "execute")
            .map(|(_, sql, _)| sql.as_str())
            .collect()
    }

    pub fn all_sql(&self) -> Vec<&str> {
        self.statements.iter().map(|(_, sql, _)| sql.as_str()).collect()
    }

    fn answer_scalar(&mut self, sql: &str) -> Value {
        if let Some(position) = self
            .scalar_once
            .iter()
            .position(|(needle, _)| sql.contains(needle.as_str()))
        {
            return self.scalar_once.remove(position).map(|(_, v)| v).unwrap_or(Value::Null);
        }
        if let Some((_, value)) = self
            .scalar_always
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            return value.clone();
        }
        Value::Int64(0)
    }

    fn answer_query(&mut self, sql: &str) -> QueryRows {
        if let Some(position) = self
            .query_once
            .iter()
            .position(|(needle, _)| sql.contains(needle.as_str()))
        {
            return self
                .query_once
                .remove(position)
                .map(|(_, rows)| rows)
                .unwrap_or_default();
        }
        if let Some((_, rows)) = self
            .query_always
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
        {
            return rows.clone();
        }
        (Vec::new(), Vec::new())
    }
}

pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> (Arc<Self>, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState {
            affected: 1,
            ..MockState::default()
        }));
        (
            Arc::new(Self {
                state: Arc::clone(&state),
            }),
            state,
        )
    }
}

impl Driver for MockDriver {
    fn connect(&self, _conn: &str, _user: &str, _password: &str) -> Result<Box<dyn DriverConnection>> {
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn database_exists(&self, _conn: &str, _user: &str, _password: &str) -> Result<bool> {
        Ok(true)
    }

    fn create_database(&self, _conn: &str, _user: &str, _password: &str) -> Result<()> {
        Ok(())
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl DriverConnection for MockConnection {
    fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(("execute", sql.to_string(), params.to_vec()));
        Ok(state.affected)
    }

    fn query(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Box<dyn DriverRows>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(("query", sql.to_string(), params.to_vec()));
        let (columns, rows) = state.answer_query(sql);
        Ok(Box::new(MockRows {
            columns,
            rows: rows.into(),
        }))
    }

    fn scalar(&mut self, sql: &str, params: &[(String, Value)]) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(("scalar", sql.to_string(), params.to_vec()));
        Ok(state.answer_scalar(sql))
    }

    fn begin(&mut self) -> Result<()> {
        self.state.lock().unwrap().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commit {
            return Err(DbError::Execution("forced commit failure".into()));
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

struct MockRows {
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
}

impl DriverRows for MockRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }
}

// ----------------------------------------------------------------------
// Database fixture
// ----------------------------------------------------------------------

pub fn database(dialect: Dialect) -> (Arc<Database>, Arc<Mutex<MockState>>) {
    let (driver, state) = MockDriver::new();
    let config = DbConfig::new("testdb", "mock://testdb", dialect, driver);
    let database = Database::new(config).unwrap();
    database.set_credentials("tester", "secret");
    (database, state)
}

pub fn mssql() -> (Arc<Database>, Arc<Mutex<MockState>>) {
    database(Dialect::MsSql)
}

// ----------------------------------------------------------------------
// Test entity
// ----------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct Person {
    core: EntityCore,
    pub name: String,
    pub age: i32,
    pub city: String,
    pub photo: Vec<u8>,
}

impl Person {
    pub fn set_name(&mut self, value: &str) {
        if self.core.track("NAME", &self.name.clone().into(), &value.into()) {
            self.name = value.to_string();
        }
    }

    pub fn set_age(&mut self, value: i32) {
        if self.core.track("AGE", &self.age.into(), &value.into()) {
            self.age = value;
        }
    }

    pub fn set_city(&mut self, value: &str) {
        if self.core.track("CITY", &self.city.clone().into(), &value.into()) {
            self.city = value.to_string();
        }
    }

    pub fn set_photo(&mut self, value: Vec<u8>) {
        if self
            .core
            .track("PHOTO", &self.photo.clone().into(), &value.clone().into())
        {
            self.photo = value;
        }
    }
}

impl Persistent for Person {
    fn describe() -> TypeDescBuilder {
        TypeDesc::table("PERSON", 200, 1)
            .log_changes()
            .field(FieldDesc::new("SYS_ID", HostType::Guid).role(FieldRole::PrimaryKey))
            .field(FieldDesc::new("SYS_CREATED", HostType::DateTime).role(FieldRole::TimestampCreated))
            .field(FieldDesc::new("SYS_CHANGED", HostType::DateTime).role(FieldRole::TimestampChanged))
            .field(FieldDesc::new("SYS_ARCHIVED", HostType::Bool).role(FieldRole::ArchiveFlag))
            .field(FieldDesc::new("NAME", HostType::Text).indexed())
            .field(FieldDesc::new("AGE", HostType::Int32))
            .field(FieldDesc::new("CITY", HostType::Text))
            .field(FieldDesc::new("PHOTO", HostType::Bytes).delayed())
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    fn get(&self, field: &str) -> Result<Value> {
        match field {
            "NAME" => Ok(self.name.clone().into()),
            "AGE" => Ok(self.age.into()),
            "CITY" => Ok(self.city.clone().into()),
            "PHOTO" => Ok(self.photo.clone().into()),
            other => Err(DbError::Structural(format!("PERSON: unknown field {}", other))),
        }
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "NAME" => self.set_name(&value.into_string().unwrap_or_default()),
            "AGE" => self.set_age(value.as_i64().unwrap_or(0) as i32),
            "CITY" => self.set_city(&value.into_string().unwrap_or_default()),
            "PHOTO" => self.set_photo(value.into_bytes().unwrap_or_default()),
            other => {
                return Err(DbError::Structural(format!("PERSON: unknown field {}", other)))
            }
        }
        Ok(())
    }
}

/// Columns and one row for materializing a PERSON.
pub fn person_row(key: uuid::Uuid, name: &str, age: i32, city: &str) -> (Vec<&'static str>, Vec<Value>) {
    (
        vec!["SYS_ID", "SYS_CREATED", "SYS_CHANGED", "SYS_ARCHIVED", "NAME", "AGE", "CITY"],
        vec![
            Value::Guid(key),
            Value::DateTime(chrono::Utc::now()),
            Value::DateTime(chrono::Utc::now()),
            Value::Bool(false),
            Value::Text(name.to_string()),
            Value::Int32(age),
            Value::Text(city.to_string()),
        ],
    )
}
