use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::prelude::Error;
use crate::session::Session;

/// Accept clients on the configured address and serve each on its own
/// thread. The engine blocks on locks and buffers by design, so a thread
/// per connection is the right shape here.
pub fn serve(config: &Config, db: Arc<Database>) -> Result<(), Error> {
    let address = config.address();
    let listener = TcpListener::bind(&address).map_err(Error::server)?;

    serve_listener(listener, db)
}

/// Serve on an already-bound listener. Split out so tests can bind an
/// ephemeral port first.
pub fn serve_listener(listener: TcpListener, db: Arc<Database>) -> Result<(), Error> {
    info!(address = %listener.local_addr()?, "cranedb listening");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    if let Err(error) = handle_connection(stream, db) {
                        warn!(%error, "connection ended with error");
                    }
                });
            }
            Err(error) => warn!(%error, "failed to accept connection"),
        }
    }

    Ok(())
}

/// One newline-terminated statement in, one JSON reply line out, until the
/// peer hangs up.
fn handle_connection(stream: TcpStream, db: Arc<Database>) -> Result<(), Error> {
    let peer = stream.peer_addr()?;
    info!(%peer, "client connected");

    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut session = Session::new(db);

    for line in reader.lines() {
        let line = line?;
        let statement = line.trim();
        if statement.is_empty() {
            continue;
        }

        let reply = session.execute(statement);
        let encoded = serde_json::to_string(&reply)?;
        writeln!(writer, "{encoded}")?;
    }

    info!(%peer, "client disconnected");
    Ok(())
}
