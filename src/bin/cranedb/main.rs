use clap::Parser;
use miette::{IntoDiagnostic, Result};

mod client;
mod daemon;

#[derive(Parser)]
#[clap(name = "CraneDB")]
#[clap(bin_name = "cranedb")]
#[clap(author, version, about, long_about = None)]
enum CraneDb {
    Daemon(daemon::Args),
    Client(client::Args),
}

fn main() -> Result<()> {
    let args = CraneDb::parse();

    match args {
        CraneDb::Daemon(x) => daemon::run(&x).into_diagnostic()?,
        CraneDb::Client(x) => client::run(&x).into_diagnostic()?,
    };

    Ok(())
}
