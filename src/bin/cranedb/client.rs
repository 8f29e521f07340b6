use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

use cranedb::prelude::*;
use serde_json::Value as JsonValue;

/// Line-oriented client: reads statements from stdin, sends each to the
/// server, and renders the JSON reply. `QUIT` and `EXIT` are handled
/// locally.
#[derive(Debug, clap::Args)]
pub struct Args {
    /// Server host; defaults to the configured / CRANEDB_HOST value.
    #[arg(long)]
    host: Option<String>,

    /// Server port; defaults to the configured / CRANEDB_PORT value.
    #[arg(long)]
    port: Option<u16>,
}

pub fn run(args: &Args) -> Result<(), Error> {
    let config = Config::load(None)?;
    let host = args.host.clone().unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);

    let stream = TcpStream::connect((host.as_str(), port)).map_err(Error::server)?;
    let mut replies = BufReader::new(stream.try_clone()?);
    let mut server = stream;

    println!("connected to {host}:{port}; QUIT or EXIT to leave");

    let stdin = io::stdin();
    loop {
        print!("cranedb> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let statement = line.trim();
        if statement.is_empty() {
            continue;
        }
        if statement.eq_ignore_ascii_case("quit") || statement.eq_ignore_ascii_case("exit") {
            break;
        }

        writeln!(server, "{statement}")?;

        let mut reply = String::new();
        if replies.read_line(&mut reply)? == 0 {
            return Err(Error::server("server closed the connection"));
        }

        render(&reply)?;
    }

    Ok(())
}

fn render(reply: &str) -> Result<(), Error> {
    let reply: JsonValue = serde_json::from_str(reply)?;

    if let Some(error) = reply["error"].as_str() {
        println!("error: {error}");
        return Ok(());
    }

    if let Some(affected) = reply["affected"].as_u64() {
        println!("{affected} record(s) affected");
        return Ok(());
    }

    let columns: Vec<&str> = reply["columns"]
        .as_array()
        .map(|cols| cols.iter().filter_map(|c| c.as_str()).collect())
        .unwrap_or_default();
    let rows = reply["rows"].as_array().cloned().unwrap_or_default();

    // column widths sized to the widest cell
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = match &row[*column] {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    widths[i] = widths[i].max(cell.len());
                    cell
                })
                .collect()
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c:<width$}", width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));
    println!("{}", "-".repeat(header.join(" | ").len()));

    for row in cells {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
            .collect();
        println!("{}", line.join(" | "));
    }
    println!("({} row(s))", rows.len());

    Ok(())
}
