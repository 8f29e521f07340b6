use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cranedb_core::{BlockId, StorageError};
use tracing::{trace, warn};

/// Lock state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Shared(u32),
    Exclusive,
}

/// Process-wide table mapping block identities to their lock state. All
/// transactions share one instance; deadlocks resolve by timeout, aborting
/// the waiter.
#[derive(Debug)]
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, LockState>>,
    cond: Condvar,
    max_wait: Duration,
}

impl LockTable {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
            max_wait,
        }
    }

    /// Acquire one shared slot on the block, waiting out any exclusive
    /// holder.
    pub fn slock(&self, block: &BlockId) -> Result<(), StorageError> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock().unwrap();

        loop {
            match locks.get(block) {
                Some(LockState::Exclusive) => {
                    locks = self.wait(locks, block, deadline)?;
                }
                Some(LockState::Shared(n)) => {
                    let n = *n;
                    locks.insert(block.clone(), LockState::Shared(n + 1));
                    return Ok(());
                }
                None => {
                    locks.insert(block.clone(), LockState::Shared(1));
                    return Ok(());
                }
            }
        }
    }

    /// Upgrade to exclusive. The caller must already hold one shared slot;
    /// the upgrade waits until it is the sole shared holder.
    pub fn xlock(&self, block: &BlockId) -> Result<(), StorageError> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock().unwrap();

        loop {
            match locks.get(block) {
                Some(LockState::Shared(1)) | None => {
                    locks.insert(block.clone(), LockState::Exclusive);
                    return Ok(());
                }
                _ => {
                    locks = self.wait(locks, block, deadline)?;
                }
            }
        }
    }

    /// Release one slot: decrement a shared count, or free the block and
    /// wake every waiter.
    pub fn unlock(&self, block: &BlockId) {
        let mut locks = self.locks.lock().unwrap();

        match locks.get(block) {
            Some(LockState::Shared(n)) if *n > 1 => {
                let n = *n;
                locks.insert(block.clone(), LockState::Shared(n - 1));
            }
            Some(_) => {
                locks.remove(block);
                self.cond.notify_all();
            }
            None => {}
        }
    }

    fn wait<'a>(
        &self,
        locks: std::sync::MutexGuard<'a, HashMap<BlockId, LockState>>,
        block: &BlockId,
        deadline: Instant,
    ) -> Result<std::sync::MutexGuard<'a, HashMap<BlockId, LockState>>, StorageError> {
        let now = Instant::now();
        if now >= deadline {
            warn!(%block, "lock wait timed out, aborting");
            return Err(StorageError::LockAbort(block.clone()));
        }

        let (guard, _) = self.cond.wait_timeout(locks, deadline - now).unwrap();
        Ok(guard)
    }
}

/// The kind of lock a transaction holds on a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeldLock {
    Shared,
    Exclusive,
}

/// Per-transaction view over the shared lock table. Tracks which blocks
/// the transaction holds so repeated requests are free, enforces
/// shared-before-exclusive acquisition, and releases everything in one go
/// at commit or rollback (strict two-phase locking).
#[derive(Debug)]
pub struct ConcurrencyManager {
    table: Arc<LockTable>,
    held: HashMap<BlockId, HeldLock>,
}

impl ConcurrencyManager {
    pub fn new(table: Arc<LockTable>) -> Self {
        Self {
            table,
            held: HashMap::new(),
        }
    }

    pub fn slock(&mut self, block: &BlockId) -> Result<(), StorageError> {
        if self.held.contains_key(block) {
            return Ok(());
        }

        self.table.slock(block)?;
        self.held.insert(block.clone(), HeldLock::Shared);
        trace!(%block, "slock acquired");

        Ok(())
    }

    pub fn xlock(&mut self, block: &BlockId) -> Result<(), StorageError> {
        if self.held.get(block) == Some(&HeldLock::Exclusive) {
            return Ok(());
        }

        self.slock(block)?;
        self.table.xlock(block)?;
        self.held.insert(block.clone(), HeldLock::Exclusive);
        trace!(%block, "xlock acquired");

        Ok(())
    }

    /// Release every lock this transaction holds.
    pub fn release(&mut self) {
        for block in self.held.keys() {
            self.table.unlock(block);
        }
        self.held.clear();
    }
}
