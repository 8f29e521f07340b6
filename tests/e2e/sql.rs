//! Full-stack SQL scenarios driven through a session, the way a client
//! connection would.

use std::sync::Arc;

use cranedb::config::Config;
use cranedb::prelude::*;
use serde_json::{json, Value as JsonValue};

fn session() -> (tempfile::TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("db"),
        ..Config::default()
    };
    let db = Arc::new(Database::open(&config).unwrap());
    (dir, Session::new(db))
}

fn execute(session: &mut Session, statement: &str) -> JsonValue {
    serde_json::to_value(session.execute(statement)).unwrap()
}

fn run_all(session: &mut Session, statements: &[&str]) {
    for statement in statements {
        let reply = execute(session, statement);
        assert!(
            reply["error"].is_null(),
            "statement {statement:?} failed: {reply}"
        );
    }
}

#[test]
fn create_insert_select() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE students (id INT, name VARCHAR(20), age INT)",
            "INSERT INTO students (id, name, age) VALUES (1, 'Alice', 20)",
            "INSERT INTO students (id, name, age) VALUES (2, 'Bob', 22)",
        ],
    );

    let reply = execute(&mut session, "SELECT id, name FROM students WHERE id = 2");
    assert_eq!(
        reply,
        json!({
            "type": "query",
            "columns": ["id", "name"],
            "rows": [{"id": 2, "name": "Bob"}],
        })
    );
}

#[test]
fn join_with_conjunctive_predicate() {
    let (_dir, mut session) = session();

    run_all(&mut session, cranedb_testing::fixtures::STUDENTS_AND_COURSES);

    let reply = execute(
        &mut session,
        "SELECT name, course FROM students, courses \
         WHERE id = student_id AND name = 'Alice'",
    );

    let mut rows = reply["rows"].as_array().unwrap().clone();
    rows.sort_by_key(|r| r["course"].as_str().unwrap().to_string());
    assert_eq!(
        rows,
        vec![
            json!({"name": "Alice", "course": "Math"}),
            json!({"name": "Alice", "course": "Physics"}),
        ]
    );
}

#[test]
fn update_then_verify() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE students (name VARCHAR(20), age INT)",
            "INSERT INTO students (name, age) VALUES ('Alice', 20)",
            "INSERT INTO students (name, age) VALUES ('Bob', 22)",
        ],
    );

    let reply = execute(
        &mut session,
        "UPDATE students SET age = 23 WHERE name = 'Bob'",
    );
    assert_eq!(reply, json!({"type": "update", "affected": 1}));

    let reply = execute(&mut session, "SELECT age FROM students WHERE name = 'Bob'");
    assert_eq!(reply["rows"], json!([{"age": 23}]));
}

#[test]
fn delete_missing_rows_affects_nothing() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE students (id INT)",
            "INSERT INTO students (id) VALUES (1)",
        ],
    );

    let reply = execute(&mut session, "DELETE FROM students WHERE id = 3");
    assert_eq!(reply, json!({"type": "update", "affected": 0}));
}

#[test]
fn index_assisted_scan() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE t (id INT, age INT, status VARCHAR(10))",
            "CREATE INDEX t_age ON t (age)",
            "INSERT INTO t (id, age, status) VALUES (1, 25, 'active')",
            "INSERT INTO t (id, age, status) VALUES (2, 25, 'idle')",
            "INSERT INTO t (id, age, status) VALUES (3, 30, 'active')",
            "INSERT INTO t (id, age, status) VALUES (4, 25, 'active')",
            "INSERT INTO t (id, age, status) VALUES (5, 31, 'idle')",
        ],
    );

    let reply = execute(
        &mut session,
        "SELECT id FROM t WHERE age = 25 AND status = 'active'",
    );

    let mut rows = reply["rows"].as_array().unwrap().clone();
    rows.sort_by_key(|r| r["id"].as_i64().unwrap());
    assert_eq!(rows, vec![json!({"id": 1}), json!({"id": 4})]);
}

#[test]
fn query_without_predicate_selects_everything() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE t (id INT)",
            "INSERT INTO t (id) VALUES (1)",
            "INSERT INTO t (id) VALUES (2)",
            "INSERT INTO t (id) VALUES (3)",
        ],
    );

    let reply = execute(&mut session, "SELECT id FROM t");
    assert_eq!(reply["rows"].as_array().unwrap().len(), 3);
}

#[test]
fn string_literals_are_case_sensitive() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE t (name VARCHAR(10))",
            "INSERT INTO t (name) VALUES ('John')",
        ],
    );

    let reply = execute(&mut session, "SELECT name FROM t WHERE name = 'john'");
    assert_eq!(reply["rows"], json!([]));

    let reply = execute(&mut session, "SELECT name FROM t WHERE name = 'John'");
    assert_eq!(reply["rows"], json!([{"name": "John"}]));
}

#[test]
fn numbers_inside_strings_are_not_coerced() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE t (code VARCHAR(10))",
            "INSERT INTO t (code) VALUES ('25')",
        ],
    );

    let reply = execute(&mut session, "SELECT code FROM t WHERE code = 25");
    assert_eq!(reply["rows"], json!([]));

    let reply = execute(&mut session, "SELECT code FROM t WHERE code = '25'");
    assert_eq!(reply["rows"], json!([{"code": "25"}]));
}

#[test]
fn views_are_queryable() {
    let (_dir, mut session) = session();

    run_all(
        &mut session,
        &[
            "CREATE TABLE people (name VARCHAR(10), age INT)",
            "INSERT INTO people (name, age) VALUES ('ann', 21)",
            "INSERT INTO people (name, age) VALUES ('bob', 35)",
            "CREATE VIEW adults AS SELECT name FROM people WHERE age = 35",
        ],
    );

    let reply = execute(&mut session, "SELECT name FROM adults");
    assert_eq!(reply["rows"], json!([{"name": "bob"}]));
}

#[test]
fn bad_syntax_reports_and_session_recovers() {
    let (_dir, mut session) = session();

    let reply = execute(&mut session, "SELECT FROM WHERE");
    assert_eq!(reply["type"], json!("query"));
    assert!(reply["error"].as_str().unwrap().contains("syntax"));

    run_all(&mut session, &["CREATE TABLE t (id INT)"]);
    let reply = execute(&mut session, "SELECT id FROM t");
    assert_eq!(reply["rows"], json!([]));
}
