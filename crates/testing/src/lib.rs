//! Test fixtures shared by the cranedb crates: throwaway databases over
//! temp directories, canned SQL data sets, and scan-draining helpers.

use std::sync::Arc;
use std::time::Duration;

use cranedb_core::Value;
use cranedb_query::{Plan, Planner};
use cranedb_storage::{BufferManager, FileManager, LockTable, LogManager, Transaction};

/// A complete storage stack over a temp directory. The directory lives as
/// long as the fixture; dropping it deletes every database file.
pub struct TempDb {
    _dir: tempfile::TempDir,
    pub fm: Arc<FileManager>,
    pub lm: Arc<LogManager>,
    pub bm: Arc<BufferManager>,
    pub locks: Arc<LockTable>,
}

/// Block size used by every fixture database.
pub const BLOCK_SIZE: usize = 400;

/// Buffer pool size used by every fixture database.
pub const BUFFER_COUNT: usize = 8;

impl TempDb {
    pub fn new() -> Self {
        Self::with_wait(Duration::from_secs(2))
    }

    /// A database whose lock and buffer waits give up after the given
    /// duration, for tests that provoke aborts.
    pub fn with_wait(max_wait: Duration) -> Self {
        Self::attach(tempfile::tempdir().unwrap(), max_wait)
    }

    /// Simulate a crash and restart: drop every manager (in-memory state,
    /// locks, and unflushed buffers die with them) and rebuild the stack
    /// over the same directory.
    pub fn reopen(self) -> Self {
        let TempDb {
            _dir,
            fm,
            lm,
            bm,
            locks,
        } = self;
        drop((fm, lm, bm, locks));

        Self::attach(_dir, Duration::from_secs(2))
    }

    fn attach(dir: tempfile::TempDir, max_wait: Duration) -> Self {
        let fm = Arc::new(FileManager::new(dir.path().join("db"), BLOCK_SIZE).unwrap());
        let lm = Arc::new(LogManager::new(Arc::clone(&fm), "cranedb.log").unwrap());
        let bm = Arc::new(BufferManager::new(
            Arc::clone(&fm),
            Arc::clone(&lm),
            BUFFER_COUNT,
            max_wait,
        ));
        let locks = Arc::new(LockTable::new(max_wait));

        Self {
            _dir: dir,
            fm,
            lm,
            bm,
            locks,
        }
    }

    pub fn tx(&self) -> Arc<Transaction> {
        Arc::new(
            Transaction::new(
                Arc::clone(&self.fm),
                Arc::clone(&self.lm),
                Arc::clone(&self.bm),
                Arc::clone(&self.locks),
            )
            .unwrap(),
        )
    }
}

impl Default for TempDb {
    fn default() -> Self {
        Self::new()
    }
}

/// One throwaway database plus a first transaction on it.
pub fn test_tx() -> (TempDb, Arc<Transaction>) {
    let db = TempDb::new();
    let tx = db.tx();
    (db, tx)
}

/// Drain a plan into rows of the named fields.
pub fn rows(plan: &Plan, fields: &[&str]) -> Vec<Vec<Value>> {
    let mut scan = plan.open().unwrap();
    let mut rows = Vec::new();

    while scan.next().unwrap() {
        rows.push(
            fields
                .iter()
                .map(|f| scan.get_value(f).unwrap())
                .collect(),
        );
    }
    scan.close().unwrap();

    rows
}

/// Canned data sets exercised by tests across the workspace.
pub mod fixtures {
    use super::*;

    /// Two students and their course enrollments.
    pub const STUDENTS_AND_COURSES: &[&str] = &[
        "CREATE TABLE students (id INT, name VARCHAR(20))",
        "CREATE TABLE courses (student_id INT, course VARCHAR(20))",
        "INSERT INTO students (id, name) VALUES (1, 'Alice')",
        "INSERT INTO students (id, name) VALUES (2, 'Bob')",
        "INSERT INTO courses (student_id, course) VALUES (1, 'Math')",
        "INSERT INTO courses (student_id, course) VALUES (1, 'Physics')",
        "INSERT INTO courses (student_id, course) VALUES (2, 'Chem')",
    ];

    /// Run every statement of a fixture through the planner in one
    /// transaction.
    pub fn load(planner: &Planner, tx: &Arc<Transaction>, statements: &[&str]) {
        for statement in statements {
            planner.execute_update(statement, tx).unwrap();
        }
    }
}
