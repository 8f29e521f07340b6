use thiserror::Error;

use crate::{BlockId, TxId};

/// Failures raised by the storage engine. Lock and buffer timeouts abort
/// the transaction that hit them; the caller is expected to roll back.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for a free buffer")]
    BufferAbort,

    #[error("timed out waiting for a lock on {0}")]
    LockAbort(BlockId),

    #[error("transaction {0} has already terminated")]
    TxTerminated(TxId),

    #[error("corrupt storage: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn corrupt(detail: impl Into<String>) -> Self {
        StorageError::Corrupt(detail.into())
    }
}

/// Failures raised by the query engine: parse rejections, catalog misses,
/// type errors, and misuse of read-only scans. Storage failures pass
/// through unchanged.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    BadSyntax(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch on field {0}")]
    TypeMismatch(String),

    #[error("value for field {0} exceeds its declared length")]
    ValueTooLong(String),

    #[error("scan does not support updates")]
    NotUpdatable,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub fn bad_syntax(detail: impl Into<String>) -> Self {
        QueryError::BadSyntax(detail.into())
    }
}
