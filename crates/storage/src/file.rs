use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use cranedb_core::{BlockId, BlockNum, StorageError};
use tracing::debug;

use crate::page::Page;

/// File names starting with this prefix are scratch space and are wiped on
/// startup.
pub const TEMP_PREFIX: &str = "temp";

/// Owns the database directory and performs all block i/o. Reads and writes
/// are whole-block and synchronous; one mutex serializes access to the open
/// file handles.
#[derive(Debug)]
pub struct FileManager {
    db_dir: PathBuf,
    block_size: usize,
    is_new: bool,
    files: Mutex<HashMap<String, File>>,
}

impl FileManager {
    /// Open the database directory, creating it when absent, and clear any
    /// leftover temp files.
    pub fn new(db_dir: impl Into<PathBuf>, block_size: usize) -> Result<Self, StorageError> {
        let db_dir = db_dir.into();
        let is_new = !db_dir.is_dir();

        if is_new {
            fs::create_dir_all(&db_dir)?;
        }

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                fs::remove_file(entry.path())?;
            }
        }

        debug!(dir = %db_dir.display(), block_size, is_new, "file manager ready");

        Ok(Self {
            db_dir,
            block_size,
            is_new,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Whether the database directory had to be created, i.e. this is a
    /// brand new database.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Read one block into the given page. Blocks past the current end of
    /// the file read back as zeroes.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> Result<(), StorageError> {
        let mut files = self.files.lock().unwrap();
        let file = self.open(&mut files, block.file_name())?;

        let offset = block.number() * self.block_size as BlockNum;
        if offset >= file.metadata()?.len() {
            page.clear();
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(page.contents_mut())?;

        Ok(())
    }

    /// Write one page's worth of bytes at the block's position.
    pub fn write(&self, block: &BlockId, page: &Page) -> Result<(), StorageError> {
        let mut files = self.files.lock().unwrap();
        let file = self.open(&mut files, block.file_name())?;

        file.seek(SeekFrom::Start(block.number() * self.block_size as BlockNum))?;
        file.write_all(page.contents())?;
        file.sync_all()?;

        Ok(())
    }

    /// Extend the file by one zeroed block and return its identity.
    pub fn append(&self, file_name: &str) -> Result<BlockId, StorageError> {
        let mut files = self.files.lock().unwrap();
        let file = self.open(&mut files, file_name)?;

        let new_num = file.metadata()?.len() / self.block_size as u64;
        let block = BlockId::new(file_name, new_num);

        file.seek(SeekFrom::Start(new_num * self.block_size as u64))?;
        file.write_all(&vec![0; self.block_size])?;
        file.sync_all()?;

        Ok(block)
    }

    /// Number of blocks currently in the file.
    pub fn block_count(&self, file_name: &str) -> Result<BlockNum, StorageError> {
        let mut files = self.files.lock().unwrap();
        let file = self.open(&mut files, file_name)?;

        Ok(file.metadata()?.len() / self.block_size as u64)
    }

    fn open<'a>(
        &self,
        files: &'a mut HashMap<String, File>,
        name: &str,
    ) -> Result<&'a mut File, StorageError> {
        if !files.contains_key(name) {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.db_dir.join(name))?;
            files.insert(name.to_string(), file);
        }

        Ok(files.get_mut(name).unwrap())
    }
}
