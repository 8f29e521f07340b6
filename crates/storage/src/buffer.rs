use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cranedb_core::{BlockId, Lsn, StorageError, TxId};
use tracing::{debug, trace, warn};

use crate::file::FileManager;
use crate::log::LogManager;
use crate::page::Page;

/// Index of a frame inside the buffer pool.
pub type FrameId = usize;

/// One pool frame: a page plus the identity of the block it holds, its pin
/// count, and the transaction/LSN of the latest unflushed modification.
#[derive(Debug)]
struct Frame {
    page: Page,
    block: Option<BlockId>,
    pins: u32,
    modifying_tx: Option<TxId>,
    lsn: Option<Lsn>,
}

impl Frame {
    fn new(block_size: usize) -> Self {
        Self {
            page: Page::new(block_size),
            block: None,
            pins: 0,
            modifying_tx: None,
            lsn: None,
        }
    }
}

/// Fixed pool of frames pinning disk blocks in memory. Pinning an absent
/// block evicts any unpinned frame; dirty victims have their log flushed
/// through the frame's last LSN before the page is written, which is what
/// makes the write-ahead discipline hold under steal.
#[derive(Debug)]
pub struct BufferManager {
    fm: Arc<FileManager>,
    lm: Arc<LogManager>,
    pool: Mutex<Vec<Frame>>,
    cond: Condvar,
    max_wait: Duration,
}

impl BufferManager {
    pub fn new(
        fm: Arc<FileManager>,
        lm: Arc<LogManager>,
        capacity: usize,
        max_wait: Duration,
    ) -> Self {
        let block_size = fm.block_size();
        let pool = (0..capacity).map(|_| Frame::new(block_size)).collect();

        Self {
            fm,
            lm,
            pool: Mutex::new(pool),
            cond: Condvar::new(),
            max_wait,
        }
    }

    /// Number of frames currently unpinned.
    pub fn available(&self) -> usize {
        let pool = self.pool.lock().unwrap();
        pool.iter().filter(|f| f.pins == 0).count()
    }

    /// Pin the block into a frame, waiting up to `max_wait` for a frame to
    /// free up when the pool is exhausted.
    pub fn pin(&self, block: &BlockId) -> Result<FrameId, StorageError> {
        let deadline = Instant::now() + self.max_wait;
        let mut pool = self.pool.lock().unwrap();

        loop {
            if let Some(frame_id) = self.try_pin(&mut pool, block)? {
                trace!(%block, frame_id, "pinned");
                return Ok(frame_id);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%block, "buffer pool exhausted, aborting");
                return Err(StorageError::BufferAbort);
            }

            let (guard, _) = self.cond.wait_timeout(pool, deadline - now).unwrap();
            pool = guard;
        }
    }

    /// Drop one pin. The last unpin wakes any transaction waiting on the
    /// pool.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut pool = self.pool.lock().unwrap();
        let frame = &mut pool[frame_id];

        frame.pins = frame.pins.saturating_sub(1);
        if frame.pins == 0 {
            self.cond.notify_all();
        }
    }

    /// Run a closure against the frame's page for reading.
    pub fn read_page<R>(&self, frame_id: FrameId, f: impl FnOnce(&Page) -> R) -> R {
        let pool = self.pool.lock().unwrap();
        f(&pool[frame_id].page)
    }

    /// Run a closure that mutates the frame's page, recording the modifying
    /// transaction. A `Some` LSN replaces the frame's last LSN; `None`
    /// keeps the previous one (used when undoing, which needs no new log
    /// record).
    pub fn modify_page<R>(
        &self,
        frame_id: FrameId,
        tx: TxId,
        lsn: Option<Lsn>,
        f: impl FnOnce(&mut Page) -> R,
    ) -> R {
        let mut pool = self.pool.lock().unwrap();
        let frame = &mut pool[frame_id];

        frame.modifying_tx = Some(tx);
        if lsn.is_some() {
            frame.lsn = lsn;
        }

        f(&mut frame.page)
    }

    /// Flush every frame dirtied by the given transaction: log first, then
    /// the page.
    pub fn flush_all(&self, tx: TxId) -> Result<(), StorageError> {
        let mut pool = self.pool.lock().unwrap();

        for frame in pool.iter_mut().filter(|f| f.modifying_tx == Some(tx)) {
            Self::flush_frame(&self.fm, &self.lm, frame)?;
        }

        Ok(())
    }

    fn try_pin(
        &self,
        pool: &mut [Frame],
        block: &BlockId,
    ) -> Result<Option<FrameId>, StorageError> {
        if let Some(id) = pool.iter().position(|f| f.block.as_ref() == Some(block)) {
            pool[id].pins += 1;
            return Ok(Some(id));
        }

        let Some(id) = pool.iter().position(|f| f.pins == 0) else {
            return Ok(None);
        };

        let frame = &mut pool[id];
        if let Some(victim) = &frame.block {
            debug!(%victim, incoming = %block, "evicting frame");
        }

        Self::flush_frame(&self.fm, &self.lm, frame)?;
        self.fm.read(block, &mut frame.page)?;

        frame.block = Some(block.clone());
        frame.pins = 1;
        frame.lsn = None;

        Ok(Some(id))
    }

    /// Write a dirty frame back to disk, pushing the log through the
    /// frame's last LSN first.
    fn flush_frame(
        fm: &FileManager,
        lm: &LogManager,
        frame: &mut Frame,
    ) -> Result<(), StorageError> {
        if frame.modifying_tx.is_none() {
            return Ok(());
        }

        if let Some(lsn) = frame.lsn {
            lm.flush(lsn)?;
        }

        if let Some(block) = &frame.block {
            fm.write(block, &frame.page)?;
        }

        frame.modifying_tx = None;
        Ok(())
    }
}
