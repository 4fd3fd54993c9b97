use std::sync::{Arc, Mutex};

use crate::{
    error::Result,
    file::{block_id::BlockId, manager::FileManager, page::Page},
    log::manager::LogManager,
    Lsn,
};

/// One frame of the buffer pool: a page of disk contents plus the
/// bookkeeping needed to pin/unpin it, know whether it is dirty, and
/// participate in clock-sweep victim selection.
///
/// All state is private and reached only through methods — there is
/// exactly one `Buffer` shape in this crate, unlike the two incompatible
/// variants this module used to carry.
#[derive(Debug)]
pub struct Buffer {
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    txnum: i32,
    lsn: Lsn,
    usage_count: bool,
}

impl Buffer {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_manager: Arc<Mutex<LogManager>>) -> Self {
        let block_size = file_manager.lock().unwrap().block_size();
        Self {
            file_manager,
            log_manager,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            txnum: -1,
            lsn: -1,
            usage_count: false,
        }
    }

    pub fn contents(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// The transaction number that last modified this buffer, or -1 if it
    /// is clean.
    pub fn modifying_tx(&self) -> i32 {
        self.txnum
    }

    pub fn set_modified(&mut self, txnum: i32, lsn: Lsn) -> Result<()> {
        self.txnum = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }

        Ok(())
    }

    /// Forces the log record this buffer's last modification depends on
    /// (the WAL rule), then writes the page itself, then marks it clean.
    pub fn flush(&mut self) -> Result<()> {
        if self.txnum >= 0 {
            self.log_manager.lock().unwrap().flush(self.lsn)?;
            if let Some(block) = &self.block {
                self.file_manager
                    .lock()
                    .unwrap()
                    .write(block, &mut self.contents)?;
            }
            self.txnum = -1;
        }
        Ok(())
    }

    pub fn assign_to_block(&mut self, block: &BlockId) -> Result<()> {
        self.flush()?;
        self.file_manager
            .lock()
            .unwrap()
            .read(block, &mut self.contents)?;
        self.block = Some(block.clone());
        self.pins = 0;
        Ok(())
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn pin(&mut self) {
        self.pins += 1;
        self.usage_count = true;
    }

    pub fn unpin(&mut self) {
        self.pins -= 1;
    }

    /// Whether this buffer has been referenced since the clock hand last
    /// swept past it.
    pub(crate) fn usage_count(&self) -> bool {
        self.usage_count
    }

    /// Gives the buffer its "second chance": clears the reference bit
    /// instead of evicting it.
    pub(crate) fn clear_usage(&mut self) {
        self.usage_count = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::{
        buffer::manager::BufferManager,
        file::{block_id::BlockId, manager::FileManager},
        log::manager::LogManager,
    };

    #[test]
    fn test_buffer() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();
        let test_log_file = temp_dir
            .path()
            .join("simpledb.log")
            .to_str()
            .unwrap()
            .to_string();

        let block_size = 400;
        let num_buffers = 3;

        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, block_size).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), &test_log_file).unwrap(),
        ));
        let buffer_manager = BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            num_buffers,
        );

        let idx1 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            let n = state.buffer_pool[idx1].contents().get_int(80).unwrap();
            state.buffer_pool[idx1]
                .contents()
                .set_int(80, n + 1)
                .unwrap();
            state.buffer_pool[idx1].set_modified(1, 0).unwrap();
            assert_eq!(1, n + 1);
        }

        buffer_manager.unpin(idx1).unwrap();

        // One of these pins will flush buff1 to disk:
        let mut idx2 = buffer_manager.pin(&BlockId::new("testfile", 2)).unwrap();
        let idx3 = buffer_manager.pin(&BlockId::new("testfile", 3)).unwrap();
        let idx4 = buffer_manager.pin(&BlockId::new("testfile", 4)).unwrap();

        buffer_manager.unpin(idx2).unwrap();

        idx2 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            state.buffer_pool[idx2]
                .contents()
                .set_int(80, 9999)
                .unwrap();
            state.buffer_pool[idx2].set_modified(1, 0).unwrap();
        }

        buffer_manager.unpin(idx3).unwrap();
        buffer_manager.unpin(idx4).unwrap();
        buffer_manager.unpin(idx2).unwrap();
    }
}
