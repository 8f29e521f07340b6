pub use cranedb_core::*;

use miette::Diagnostic;
use std::fmt::Display;
use thiserror::Error;

pub use crate::config::Config;
pub use crate::db::Database;
pub use crate::session::{Reply, Session};

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("io error: {0}")]
    IO(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("query error: {0}")]
    QueryError(#[from] QueryError),

    #[error("encoding error: {0}")]
    EncodingError(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::ConfigError(text.to_string())
    }

    pub fn server(error: impl Display) -> Error {
        Error::ServerError(error.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }
}
