//! Wire-protocol smoke tests: a real TCP listener, newline-delimited
//! statements in, one JSON line back per statement.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use cranedb::config::Config;
use cranedb::prelude::Database;
use cranedb::serve::serve_listener;
use serde_json::{json, Value as JsonValue};

struct Server {
    _dir: tempfile::TempDir,
    address: std::net::SocketAddr,
}

fn start_server() -> Result<Server> {
    let dir = tempfile::tempdir()?;
    let config = Config {
        data_dir: dir.path().join("db"),
        // short waits so contending statements abort and retry quickly
        max_wait_ms: 300,
        ..Config::default()
    };
    let db = Arc::new(Database::open(&config)?);

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let address = listener.local_addr()?;
    thread::spawn(move || serve_listener(listener, db));

    Ok(Server { _dir: dir, address })
}

fn roundtrip(
    reader: &mut BufReader<TcpStream>,
    writer: &mut TcpStream,
    statement: &str,
) -> Result<JsonValue> {
    writeln!(writer, "{statement}")?;

    let mut line = String::new();
    reader.read_line(&mut line)?;

    Ok(serde_json::from_str(&line)?)
}

#[test]
fn statements_round_trip_as_json_lines() -> Result<()> {
    let server = start_server()?;

    let stream = TcpStream::connect(server.address)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let reply = roundtrip(&mut reader, &mut writer, "CREATE TABLE t (id INT, name VARCHAR(10))")?;
    assert_eq!(reply, json!({"type": "update", "affected": 0}));

    let reply = roundtrip(
        &mut reader,
        &mut writer,
        "INSERT INTO t (id, name) VALUES (1, 'ann')",
    )?;
    assert_eq!(reply, json!({"type": "update", "affected": 1}));

    let reply = roundtrip(&mut reader, &mut writer, "SELECT id, name FROM t")?;
    assert_eq!(
        reply,
        json!({
            "type": "query",
            "columns": ["id", "name"],
            "rows": [{"id": 1, "name": "ann"}],
        })
    );

    Ok(())
}

#[test]
fn errors_come_back_as_error_replies() -> Result<()> {
    let server = start_server()?;

    let stream = TcpStream::connect(server.address)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let reply = roundtrip(&mut reader, &mut writer, "SELECT id FROM missing")?;
    assert_eq!(reply["type"], json!("query"));
    assert!(reply["error"].as_str().unwrap().contains("unknown table"));

    // the session survives and keeps serving
    let reply = roundtrip(&mut reader, &mut writer, "CREATE TABLE t (id INT)")?;
    assert_eq!(reply, json!({"type": "update", "affected": 0}));

    Ok(())
}

#[test]
fn concurrent_clients_get_their_own_sessions() -> Result<()> {
    let server = start_server()?;

    let stream = TcpStream::connect(server.address)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    roundtrip(&mut reader, &mut writer, "CREATE TABLE t (id INT)")?;

    let workers: Vec<_> = (0..4)
        .map(|n| {
            let address = server.address;
            thread::spawn(move || -> Result<()> {
                let stream = TcpStream::connect(address)?;
                let mut reader = BufReader::new(stream.try_clone()?);
                let mut writer = stream;

                // contending inserts may abort on a lock timeout; retry
                // like a real client until the statement lands
                let statement = format!("INSERT INTO t (id) VALUES ({n})");
                for _ in 0..20 {
                    let reply = roundtrip(&mut reader, &mut writer, &statement)?;
                    if reply == json!({"type": "update", "affected": 1}) {
                        return Ok(());
                    }
                    assert!(reply["error"].as_str().unwrap_or_default().contains("timed out"));
                }

                panic!("insert kept timing out");
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap()?;
    }

    let reply = roundtrip(&mut reader, &mut writer, "SELECT id FROM t")?;
    assert_eq!(reply["rows"].as_array().unwrap().len(), 4);

    Ok(())
}
