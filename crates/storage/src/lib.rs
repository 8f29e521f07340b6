//! Block-oriented transactional storage engine: fixed-size pages over named
//! files, an undo-only write-ahead log, a pinning buffer pool, strict
//! two-phase block locking, slotted record pages, heap table scans, and a
//! static hash index.
//!
//! Layering is strictly bottom-up: every module uses only the ones below
//! it. All shared managers are internally synchronized and are handed to
//! transactions as `Arc` handles.

pub mod buffer;
pub mod concurrency;
pub mod file;
pub mod index;
pub mod log;
pub mod page;
pub mod record;
pub mod recovery;
pub mod scan;
pub mod tx;

pub use buffer::BufferManager;
pub use concurrency::LockTable;
pub use file::FileManager;
pub use index::HashIndex;
pub use log::LogManager;
pub use page::Page;
pub use record::RecordPage;
pub use recovery::LogRecord;
pub use scan::TableScan;
pub use tx::Transaction;

use std::time::Duration;

/// Upper bound on every lock-table and buffer-pool wait. Hitting it aborts
/// the waiting transaction.
pub const MAX_WAIT: Duration = Duration::from_secs(10);
