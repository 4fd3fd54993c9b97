use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use tracing::{debug, info};

use crate::error::Result;

use super::block_id::BlockId;
use super::page::Page;

/// Turns a directory tree into an array of fixed-size blocks addressed by
/// `(filename, block-number)`, and mediates all raw reads/writes to it.
///
/// All public methods serialize on a single internal lock per open file; the
/// simplest correct implementation is used here rather than per-region
/// locking, matching spec §4.1.
#[derive(Debug)]
pub struct FileManager {
    db_dir: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: HashMap<String, Arc<Mutex<File>>>,
}

impl FileManager {
    pub fn new(db_dir: &str, block_size: usize) -> Result<Self> {
        let path = Path::new(db_dir);
        let is_new = !path.exists();

        if is_new {
            std::fs::create_dir_all(path)?;
            info!(dir = %path.display(), "created new database directory");
        }

        // Remove any leftover temporary tables from a prior run.
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let entry_path = entry.path();
            let is_temp = entry_path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("temp"));

            if entry_path.is_file() && is_temp {
                debug!(file = %entry_path.display(), "removing leftover temp file");
                std::fs::remove_file(entry_path)?;
            }
        }

        Ok(Self {
            db_dir: path.to_path_buf(),
            block_size,
            is_new,
            open_files: HashMap::new(),
        })
    }

    /// Reads exactly `block_size` bytes from `blk` into `page`. Fails if the
    /// block does not exist or the underlying I/O fails — short reads are
    /// not silently tolerated.
    pub fn read(&mut self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let file = self.get_file(blk.filename())?;
        let mut guard = file.lock().unwrap();
        guard.seek(SeekFrom::Start(self.offset_of(blk)))?;

        let mut bytes = vec![0u8; self.block_size];
        guard.read_exact(&mut bytes)?;
        page.load(&bytes);

        Ok(())
    }

    /// Writes `block_size` bytes of `page` to `blk` and flushes the OS
    /// buffer so the write is visible to subsequent reads. Does not fsync.
    pub fn write(&mut self, blk: &BlockId, page: &mut Page) -> Result<()> {
        let file = self.get_file(blk.filename())?;
        let mut guard = file.lock().unwrap();
        guard.seek(SeekFrom::Start(self.offset_of(blk)))?;
        guard.write_all(page.contents().as_bytes())?;
        guard.flush()?;

        Ok(())
    }

    /// Returns a new block one past the current end of `filename`, writing
    /// `block_size` zero bytes so the block physically exists.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let new_block_number = self.length(filename)? as i64;
        let blk = BlockId::new(filename, new_block_number);
        let bytes = vec![0u8; self.block_size];

        let file = self.get_file(blk.filename())?;
        let mut guard = file.lock().unwrap();
        guard.seek(SeekFrom::Start(self.offset_of(&blk)))?;
        guard.write_all(&bytes)?;
        guard.flush()?;

        Ok(blk)
    }

    /// Current number of blocks in `filename`, computed from the file's
    /// actual size (a stat call), not from a cursor position.
    pub fn length(&mut self, filename: &str) -> Result<usize> {
        let file = self.get_file(filename)?;
        let guard = file.lock().unwrap();
        let len = guard.metadata()?.len() as usize;

        Ok(len / self.block_size)
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn offset_of(&self, blk: &BlockId) -> u64 {
        blk.block_number() as u64 * self.block_size as u64
    }

    fn get_file(&mut self, filename: &str) -> Result<Arc<Mutex<File>>> {
        if let Some(file) = self.open_files.get(filename) {
            return Ok(Arc::clone(file));
        }

        let path = self.db_dir.join(filename);
        let file = Arc::new(Mutex::new(
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?,
        ));

        self.open_files.insert(filename.to_string(), Arc::clone(&file));
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::FileManager;
    use crate::file::{block_id::BlockId, page::Page};
    use tempfile::tempdir;

    #[test]
    fn read_write_int_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let block_size = 512;

        let mut fm = FileManager::new(db_dir, block_size).unwrap();
        let filename = "simple_int.tbl";
        let block = BlockId::new(filename, 0);

        let mut page = Page::new(block_size);
        page.set_int(0, 42).unwrap();

        fm.write(&block, &mut page).unwrap();
        fm.read(&block, &mut page).unwrap();

        assert_eq!(page.get_int(0).unwrap(), 42);
        assert_eq!(fm.length(filename).unwrap(), 1);
    }

    #[test]
    fn read_write_string_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let block_size = 512;

        let mut fm = FileManager::new(db_dir, block_size).unwrap();
        let filename = "simple_string.tbl";
        let block = BlockId::new(filename, 0);

        let mut page = Page::new(block_size);
        page.set_string(0, "Hello, SimpleDB!").unwrap();

        fm.write(&block, &mut page).unwrap();
        fm.read(&block, &mut page).unwrap();

        assert_eq!(page.get_string(0).unwrap(), "Hello, SimpleDB!");
    }

    #[test]
    fn append_allocates_sequential_blocks() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let mut fm = FileManager::new(db_dir, 512).unwrap();

        let filename = "simple.tbl";
        let block1 = fm.append(filename).unwrap();
        assert_eq!(block1.block_number(), 0);

        let block2 = fm.append(filename).unwrap();
        assert_eq!(block2.block_number(), 1);

        assert_eq!(fm.length(filename).unwrap(), 2);
    }

    #[test]
    fn disk_roundtrip_two_blocks() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let block_size = 64;
        let mut fm = FileManager::new(db_dir, block_size).unwrap();

        let filename = "round.tbl";
        let blk0 = BlockId::new(filename, 0);
        let blk1 = BlockId::new(filename, 1);

        let mut hello = Page::new(block_size);
        hello.set_bytes(0, b"hello").unwrap();
        fm.write(&blk0, &mut hello).unwrap();

        let mut world = Page::new(block_size);
        world.set_bytes(0, b"world").unwrap();
        fm.write(&blk1, &mut world).unwrap();

        let mut readback = Page::new(block_size);
        fm.read(&blk0, &mut readback).unwrap();
        assert_eq!(readback.get_bytes(0).unwrap(), b"hello");

        fm.read(&blk1, &mut readback).unwrap();
        assert_eq!(readback.get_bytes(0).unwrap(), b"world");
    }

    #[test]
    fn leftover_temp_files_are_removed_on_open() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path();
        std::fs::write(db_dir.join("temp_scratch"), b"stale").unwrap();

        let _fm = FileManager::new(db_dir.to_str().unwrap(), 512).unwrap();
        assert!(!db_dir.join("temp_scratch").exists());
    }
}
