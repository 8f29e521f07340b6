//! Crash and restart scenarios: uncommitted work must vanish, committed
//! work must survive, and recovery must checkpoint and be idempotent.

use std::sync::Arc;

use cranedb::config::Config;
use cranedb::prelude::*;
use cranedb::storage::LogRecord;
use cranedb_query::{MetadataManager, Planner};
use cranedb_testing::{rows, TempDb};

fn planner_on(tx: &Arc<cranedb::storage::Transaction>, is_new: bool) -> Planner {
    Planner::new(Arc::new(MetadataManager::new(is_new, tx).unwrap()))
}

#[test]
fn uncommitted_changes_are_undone_on_recovery() {
    let db = TempDb::new();

    // committed baseline
    let tx = db.tx();
    let planner = planner_on(&tx, true);
    planner
        .execute_update("CREATE TABLE t (balance INT)", &tx)
        .unwrap();
    planner
        .execute_update("INSERT INTO t (balance) VALUES (100)", &tx)
        .unwrap();
    tx.commit().unwrap();

    // a transaction mutates, its dirty page reaches disk, and then the
    // process dies before commit
    let crashing = db.tx();
    planner
        .execute_update("UPDATE t SET balance = 999", &crashing)
        .unwrap();
    db.bm.flush_all(crashing.id()).unwrap();
    drop(crashing);

    // restart: recover under a fresh transaction
    let db = db.reopen();
    let tx = db.tx();
    tx.recover().unwrap();

    let planner = planner_on(&tx, false);
    let plan = planner
        .create_query_plan("SELECT balance FROM t", &tx)
        .unwrap();
    assert_eq!(rows(&plan, &["balance"]), vec![vec![Value::Int(100)]]);

    tx.commit().unwrap();
}

#[test]
fn recovery_appends_a_checkpoint() {
    let db = TempDb::new();

    let tx = db.tx();
    let planner = planner_on(&tx, true);
    planner
        .execute_update("CREATE TABLE t (a INT)", &tx)
        .unwrap();
    tx.commit().unwrap();

    let tx = db.tx();
    tx.recover().unwrap();
    tx.commit().unwrap();

    // the newest interesting record in the log is the checkpoint (the
    // recovery transaction's own bookkeeping may sit above it)
    let checkpoint_seen = db
        .lm
        .iter()
        .unwrap()
        .map(|bytes| LogRecord::from_bytes(&bytes.unwrap()).unwrap())
        .take(3)
        .any(|record| record == LogRecord::Checkpoint);

    assert!(checkpoint_seen);
}

#[test]
fn recovery_is_idempotent() {
    let db = TempDb::new();

    let tx = db.tx();
    let planner = planner_on(&tx, true);
    planner
        .execute_update("CREATE TABLE t (a INT)", &tx)
        .unwrap();
    planner
        .execute_update("INSERT INTO t (a) VALUES (7)", &tx)
        .unwrap();
    tx.commit().unwrap();

    let crashing = db.tx();
    planner
        .execute_update("UPDATE t SET a = 8", &crashing)
        .unwrap();
    db.bm.flush_all(crashing.id()).unwrap();
    drop(crashing);

    let db = db.reopen();
    for _ in 0..2 {
        let tx = db.tx();
        tx.recover().unwrap();
        tx.commit().unwrap();
    }

    let tx = db.tx();
    let planner = planner_on(&tx, false);
    let plan = planner.create_query_plan("SELECT a FROM t", &tx).unwrap();
    assert_eq!(rows(&plan, &["a"]), vec![vec![Value::Int(7)]]);

    tx.commit().unwrap();
}

#[test]
fn database_reopen_recovers_and_serves() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("db"),
        ..Config::default()
    };

    {
        let db = Database::open(&config).unwrap();
        let tx = db.new_tx().unwrap();
        db.planner()
            .execute_update("CREATE TABLE t (a INT)", &tx)
            .unwrap();
        db.planner()
            .execute_update("INSERT INTO t (a) VALUES (5)", &tx)
            .unwrap();
        tx.commit().unwrap();

        // leave an uncommitted transaction dangling at "crash" time
        let dangling = db.new_tx().unwrap();
        db.planner()
            .execute_update("UPDATE t SET a = 6", &dangling)
            .unwrap();
    }

    let db = Database::open(&config).unwrap();
    let tx = db.new_tx().unwrap();
    let plan = db.planner().create_query_plan("SELECT a FROM t", &tx).unwrap();

    let mut scan = plan.open().unwrap();
    assert!(scan.next().unwrap());
    assert_eq!(scan.get_int("a").unwrap(), 5);
    scan.close().unwrap();

    tx.commit().unwrap();
}
