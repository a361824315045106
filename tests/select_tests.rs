//! Select family: materialization, filters, projections, the streaming
//! reader, and delayed-field loading.
//!
//! Run with: cargo test --test select_tests

mod common;

use common::{mssql, person_row, Person};
use rustormdb::core::Value;
use rustormdb::{Persistent, ReadOptions};
use uuid::Uuid;

#[test]
fn test_select_materializes_rows() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let key = Uuid::new_v4();
    {
        let (columns, row) = person_row(key, "Ada", 36, "London");
        state
            .lock()
            .unwrap()
            .push_query("FROM PERSON", &columns, vec![row]);
    }

    let people: Vec<Person> = conn.select_all(&ReadOptions::new()).unwrap();
    assert_eq!(people.len(), 1);
    let ada = &people[0];
    assert_eq!(ada.name, "Ada");
    assert_eq!(ada.age, 36);
    assert_eq!(ada.core().key(), key);
    assert!(!ada.is_dirty());
    assert!(ada.core().database().is_some());
}

#[test]
fn test_default_projection_omits_delayed_fields() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let _: Vec<Person> = conn.select_all(&ReadOptions::new()).unwrap();
    let with_delayed: ReadOptions<Person> = ReadOptions::new().ignore_delayed();
    let _: Vec<Person> = conn.select_all(&with_delayed).unwrap();

    let state = state.lock().unwrap();
    let selects: Vec<&str> = state
        .statements
        .iter()
        .filter(|(kind, _, _)| *kind == "query")
        .map(|(_, sql, _)| sql.as_str())
        .collect();
    assert_eq!(selects.len(), 2);
    assert!(!selects[0].contains("PHOTO"));
    assert!(selects[1].contains("PHOTO"));
}

#[test]
fn test_filter_applies_after_materialization() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    {
        let (columns, ada) = person_row(Uuid::new_v4(), "Ada", 36, "London");
        let (_, grace) = person_row(Uuid::new_v4(), "Grace", 45, "New York");
        state
            .lock()
            .unwrap()
            .push_query("FROM PERSON", &columns, vec![ada, grace]);
    }

    let options = ReadOptions::new().filter(|p: &Person| p.city == "London");
    let people: Vec<Person> = conn.select_all(&options).unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].name, "Ada");
}

#[test]
fn test_max_records_caps_result_and_sql() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    {
        let (columns, ada) = person_row(Uuid::new_v4(), "Ada", 36, "London");
        let (_, grace) = person_row(Uuid::new_v4(), "Grace", 45, "New York");
        let (_, edsger) = person_row(Uuid::new_v4(), "Edsger", 72, "Austin");
        state
            .lock()
            .unwrap()
            .push_query("FROM PERSON", &columns, vec![ada, grace, edsger]);
    }

    let options: ReadOptions<Person> = ReadOptions::new().max_records(2);
    let people: Vec<Person> = conn.select_all(&options).unwrap();
    assert_eq!(people.len(), 2);

    let state = state.lock().unwrap();
    let (_, sql, _) = state
        .statements
        .iter()
        .find(|(kind, _, _)| *kind == "query")
        .unwrap();
    assert!(sql.starts_with("SELECT TOP 2 "));
}

#[test]
fn test_order_by_descending() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let options: ReadOptions<Person> = ReadOptions::new()
        .order_by("NAME")
        .order_mode(rustormdb::OrderMode::Descending);
    let _: Vec<Person> = conn.select_all(&options).unwrap();

    let state = state.lock().unwrap();
    let (_, sql, _) = state
        .statements
        .iter()
        .find(|(kind, _, _)| *kind == "query")
        .unwrap();
    assert!(sql.ends_with("ORDER BY NAME DESC"));
}

#[test]
fn test_load_by_key() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let key = Uuid::new_v4();
    {
        let (columns, row) = person_row(key, "Ada", 36, "London");
        state
            .lock()
            .unwrap()
            .push_query("WHERE SYS_ID = @p0", &columns, vec![row]);
    }

    let found: Option<Person> = conn.load(key).unwrap();
    assert_eq!(found.unwrap().name, "Ada");

    let missing: Option<Person> = conn.load(Uuid::new_v4()).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_streaming_reader() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    {
        let (columns, ada) = person_row(Uuid::new_v4(), "Ada", 36, "London");
        let (_, grace) = person_row(Uuid::new_v4(), "Grace", 45, "New York");
        state
            .lock()
            .unwrap()
            .push_query("FROM PERSON", &columns, vec![ada, grace]);
    }

    let mut reader = conn.reader(&ReadOptions::<Person>::new(), |_| Ok(())).unwrap();
    assert!(!reader.eof());
    let first = reader.read().unwrap().unwrap();
    assert_eq!(first.name, "Ada");
    let second = reader.read().unwrap().unwrap();
    assert_eq!(second.name, "Grace");
    assert!(reader.read().unwrap().is_none());
    assert!(reader.eof());
    reader.close();
}

#[test]
fn test_delayed_field_loads_once() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let key = Uuid::new_v4();
    {
        let (columns, row) = person_row(key, "Ada", 36, "London");
        let mut state = state.lock().unwrap();
        state.push_query("FROM PERSON", &columns, vec![row]);
        state.push_scalar("SELECT PHOTO FROM PERSON", Value::Bytes(vec![7, 7, 7]));
    }

    let mut ada: Person = conn
        .select_all(&ReadOptions::new())
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert!(!ada.core().is_delayed_loaded("PHOTO"));

    let photo = ada.delayed_value("PHOTO").unwrap();
    assert_eq!(photo, Value::Bytes(vec![7, 7, 7]));
    assert!(ada.core().is_delayed_loaded("PHOTO"));
    assert!(!ada.is_dirty());

    let statements_after_first = state.lock().unwrap().statements.len();
    let again = ada.delayed_value("PHOTO").unwrap();
    assert_eq!(again, Value::Bytes(vec![7, 7, 7]));
    assert_eq!(state.lock().unwrap().statements.len(), statements_after_first);

    ada.core_mut().reset_delayed();
    assert!(!ada.core().is_delayed_loaded("PHOTO"));
}

#[test]
fn test_is_unique() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let key = Uuid::new_v4();
    // No other row carries the value: the driver yields NULL.
    state
        .lock()
        .unwrap()
        .push_scalar("SELECT SYS_ID FROM PERSON", Value::Null);
    let unique = conn
        .is_unique::<Person>(key, "NAME", &Value::Text("Ada".into()))
        .unwrap();
    assert!(unique);

    state
        .lock()
        .unwrap()
        .push_scalar("SELECT SYS_ID FROM PERSON", Value::Guid(Uuid::new_v4()));
    let taken = conn
        .is_unique::<Person>(key, "NAME", &Value::Text("Ada".into()))
        .unwrap();
    assert!(!taken);
}

#[test]
fn test_count_and_sum() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    {
        let mut state = state.lock().unwrap();
        state.push_scalar("SELECT COUNT(NAME) FROM PERSON", Value::Int64(42));
        state.push_scalar("SELECT SUM(AGE) FROM PERSON", Value::Int64(1234));
    }

    assert_eq!(conn.count::<Person>("NAME").unwrap(), 42);
    assert_eq!(conn.sum::<Person>("AGE").unwrap(), Value::Int64(1234));
}

#[test]
fn test_rows_returns_untyped_tabular_data() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    state.lock().unwrap().push_query(
        "SELECT NAME",
        &["NAME"],
        vec![vec![Value::Text("Ada".into())], vec![Value::Text("Grace".into())]],
    );

    let rows = conn.rows("SELECT NAME FROM PERSON WHERE AGE > ?", vec![30.into()]).unwrap();
    assert_eq!(rows.columns, vec!["NAME".to_string()]);
    assert_eq!(rows.row_count(), 2);

    let state = state.lock().unwrap();
    let (_, sql, params) = state
        .statements
        .iter()
        .find(|(kind, _, _)| *kind == "query")
        .unwrap();
    assert_eq!(sql, "SELECT NAME FROM PERSON WHERE AGE > @p0");
    assert_eq!(params[0], ("p0".to_string(), Value::Int32(30)));
}

#[test]
fn test_custom_snippet_rewrites_raw_sql() {
    use common::MockDriver;
    use rustormdb::{Database, DbConfig, Dialect};

    let (driver, state) = MockDriver::new();
    let config = DbConfig::new("testdb", "mock://testdb", Dialect::MsSql, driver)
        .snippet("UPPERTRIM", "UPPER(LTRIM(RTRIM(<p1>)))");
    let db = Database::new(config).unwrap();

    assert_eq!(
        db.translate_constant("WHERE UPPERTRIM(NAME) = ?"),
        "WHERE UPPER(LTRIM(RTRIM(NAME))) = ?"
    );

    let mut conn = db.open_connection().unwrap();
    conn.execute("DELETE FROM PERSON WHERE UPPERTRIM(CITY) = ?", vec!["PARIS".into()])
        .unwrap();
    let state = state.lock().unwrap();
    let (_, sql, _) = state
        .statements
        .iter()
        .find(|(kind, _, _)| *kind == "execute")
        .unwrap();
    assert_eq!(sql, "DELETE FROM PERSON WHERE UPPER(LTRIM(RTRIM(CITY))) = @p0");
}

#[test]
fn test_enumerable_argument_flattens_once() {
    let (db, state) = mssql();
    let mut conn = db.open_connection().unwrap();

    let list = Value::Json(serde_json::json!([30, 45]));
    conn.execute("DELETE FROM PERSON WHERE AGE IN (?, ?)", vec![list])
        .unwrap();

    let state = state.lock().unwrap();
    let (_, sql, params) = state
        .statements
        .iter()
        .find(|(kind, _, _)| *kind == "execute")
        .unwrap();
    assert_eq!(sql, "DELETE FROM PERSON WHERE AGE IN (@p0, @p1)");
    assert_eq!(params[0].1, Value::Int64(30));
    assert_eq!(params[1].1, Value::Int64(45));
}
