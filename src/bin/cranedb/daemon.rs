use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use cranedb::prelude::*;
use tracing::Level;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "cranedb.toml")]
    config: PathBuf,
}

pub fn run(args: &Args) -> Result<(), Error> {
    let config = Config::load(Some(&args.config))?;

    let level = config
        .logging
        .max_level
        .as_deref()
        .map(Level::from_str)
        .transpose()
        .map_err(Error::config)?
        .unwrap_or(Level::INFO);

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )
    .unwrap();

    let db = Arc::new(Database::open(&config)?);

    cranedb::serve::serve(&config, db)
}
