//! Types and errors that are common to all cranedb crates.
//!
//! Glossary:
//!  - `block`: fixed-size unit of disk i/o within a file; the storage
//!    engine's atom.
//!  - `slot`: fixed-offset region inside a record page holding one record
//!    plus its status cell.
//!  - `rid`: record identifier, a (block, slot) pair within one table file.
//!  - `layout`: per-table mapping of field names to byte offsets plus the
//!    total slot size.

pub mod block;
pub mod errors;
pub mod schema;
pub mod value;

/// Monotonically increasing transaction number.
pub type TxId = i32;

/// Log sequence number assigned at log append.
pub type Lsn = i64;

/// The position of a block within its file.
pub type BlockNum = u64;

/// The position of a slot within its record page.
pub type SlotId = usize;

pub use block::{BlockId, Rid};
pub use errors::{QueryError, StorageError};
pub use schema::{FieldInfo, Layout, Schema, SqlType};
pub use value::Value;
