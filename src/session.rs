use std::sync::Arc;

use cranedb_query::{Parser, Statement};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::db::Database;
use crate::prelude::Error;

/// One JSON line back to the client per statement. Int fields serialize as
/// JSON numbers, string fields as JSON strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    Query {
        #[serde(skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        rows: Option<Vec<Map<String, JsonValue>>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Update {
        #[serde(skip_serializing_if = "Option::is_none")]
        affected: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Reply {
    fn rows(columns: Vec<String>, rows: Vec<Map<String, JsonValue>>) -> Self {
        Reply::Query {
            columns: Some(columns),
            rows: Some(rows),
            error: None,
        }
    }

    fn affected(count: usize) -> Self {
        Reply::Update {
            affected: Some(count),
            error: None,
        }
    }

    fn error(kind: StatementKind, message: String) -> Self {
        match kind {
            StatementKind::Query => Reply::Query {
                columns: None,
                rows: None,
                error: Some(message),
            },
            StatementKind::Update => Reply::Update {
                affected: None,
                error: Some(message),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StatementKind {
    Query,
    Update,
}

/// Classify a raw line so errors report under the right reply type. A
/// line that cannot be classified reports as a query.
fn classify(line: &str) -> StatementKind {
    let first = line.split_whitespace().next().unwrap_or_default();

    if first.is_empty() || first.eq_ignore_ascii_case("select") {
        StatementKind::Query
    } else {
        StatementKind::Update
    }
}

/// Runs SQL statements for one client. Each statement gets its own
/// transaction: committed on success, rolled back on any error. Errors
/// never end the session; the next statement starts a fresh transaction.
#[derive(Debug)]
pub struct Session {
    db: Arc<Database>,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn execute(&mut self, line: &str) -> Reply {
        // tolerate conventional trailing semicolons
        let line = line.trim().trim_end_matches(';').trim_end();

        let kind = classify(line);
        debug!(statement = line, "executing");

        match self.run(line) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(statement = line, %error, "statement failed");
                Reply::error(kind, error.to_string())
            }
        }
    }

    fn run(&self, line: &str) -> Result<Reply, Error> {
        let tx = self.db.new_tx()?;

        match self.dispatch(line, &tx) {
            Ok(reply) => {
                tx.commit()?;
                Ok(reply)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback() {
                    warn!(%rollback_error, "rollback after failed statement also failed");
                }
                Err(error)
            }
        }
    }

    fn dispatch(
        &self,
        line: &str,
        tx: &Arc<cranedb_storage::Transaction>,
    ) -> Result<Reply, Error> {
        let statement = Parser::new(line)?.statement()?;
        let planner = self.db.planner();

        match statement {
            Statement::Query(data) => {
                let plan = planner.plan_query(data, tx)?;
                let columns = plan.schema().fields().to_vec();

                let mut scan = plan.open()?;
                let mut rows = Vec::new();
                while scan.next()? {
                    let mut row = Map::new();
                    for column in &columns {
                        let value = scan.get_value(column)?;
                        row.insert(column.clone(), serde_json::to_value(value)?);
                    }
                    rows.push(row);
                }
                scan.close()?;

                Ok(Reply::rows(columns, rows))
            }
            other => Ok(Reply::affected(planner.execute_statement(other, tx)?)),
        }
    }
}
