use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc, Mutex,
};

use tracing::debug;

use crate::{
    buffer::manager::BufferManager,
    error::{Error, Result},
    file::{
        block_id::{BlockId, END_OF_FILE},
        manager::FileManager,
    },
    log::manager::LogManager,
};

use super::{
    bufferlist::BufferList,
    concurrency::{lock_table::LockTable, manager::ConcurrencyManager},
    recovery::manager::RecoveryManager,
};

/// Process-wide monotonic counter, first value 1. Seeded past the log's
/// highest observed transaction number by [`Transaction::recover`] during
/// startup, so post-restart numbering never collides with numbers that
/// survive in the log.
static NEXT_TX_NUM: AtomicI32 = AtomicI32::new(1);

fn next_tx_number() -> i32 {
    NEXT_TX_NUM.fetch_add(1, Ordering::SeqCst)
}

/// Bumps the process-wide counter so the next transaction number is
/// strictly greater than `txnum`, without ever moving it backwards.
fn bump_tx_number_past(txnum: i32) {
    NEXT_TX_NUM.fetch_max(txnum + 1, Ordering::SeqCst);
}

/// A client-facing unit of work over block-addressed storage: automatic
/// strict two-phase locking, physical undo logging, and buffer pin
/// bookkeeping, composed from a [`ConcurrencyManager`], a [`RecoveryManager`],
/// and a per-transaction [`BufferList`].
#[derive(Debug)]
pub struct Transaction {
    recovery_manager: RecoveryManager,
    concurrency_manager: ConcurrencyManager,
    buffer_manager: Arc<BufferManager>,
    file_manager: Arc<Mutex<FileManager>>,
    buffers: BufferList,
    txnum: i32,
}

impl Transaction {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        buffer_manager: Arc<BufferManager>,
        lock_table: LockTable,
    ) -> Result<Self> {
        let txnum = next_tx_number();
        let recovery_manager =
            RecoveryManager::new(Arc::clone(&log_manager), Arc::clone(&buffer_manager), txnum)?;
        let concurrency_manager = ConcurrencyManager::new(lock_table);
        let tx_buffers = BufferList::new(Arc::clone(&buffer_manager));

        debug!(txnum, "transaction started");

        Ok(Self {
            recovery_manager,
            concurrency_manager,
            buffer_manager,
            file_manager,
            buffers: tx_buffers,
            txnum,
        })
    }

    pub fn tx_number(&self) -> i32 {
        self.txnum
    }

    /// Flush all modified buffers (and their log records), write and flush
    /// a commit record to the log, release all locks, and unpin any pinned
    /// buffers.
    pub fn commit(&mut self) -> Result<()> {
        self.recovery_manager.commit()?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Undo any modified values, flush those buffers, write and flush a
    /// rollback record to the log, release all locks, and unpin any pinned
    /// buffers.
    pub fn rollback(&mut self) -> Result<()> {
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.rollback(self)?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Flush all modified buffers, then go through the log rolling back
    /// every uncommitted transaction and write a quiescent checkpoint
    /// record. Called on a fresh transaction during system startup, before
    /// user transactions begin; seeds the process-wide transaction counter
    /// past the highest txnum observed anywhere in the log.
    pub fn recover(&mut self) -> Result<()> {
        self.buffer_manager.flush_all(self.txnum)?;
        let recovery_manager = self.recovery_manager.clone();
        let max_txnum = recovery_manager.recover(self)?;
        bump_tx_number_past(max_txnum);
        Ok(())
    }

    /// Pins the block and manages the buffer for the client.
    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.pin(block)?;
        Ok(())
    }

    /// Looks up the buffer pinned to this block, and unpins it.
    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.unpin(block)?;
        Ok(())
    }

    /// Returns the integer value stored at the specified offset of the
    /// specified block, after obtaining an slock on the block.
    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.concurrency_manager.slock(block)?;

        let idx = self.buffers.get_buffer_idx(block).ok_or_else(|| {
            Error::TransactionAbort {
                txnum: self.txnum,
                block: Some(block.clone()),
            }
        })?;
        let (lock, _) = &*self.buffer_manager.state;
        let mut state = lock.lock().unwrap();
        state.buffer_pool[idx].contents().get_int(offset)
    }

    /// Returns the string value stored at the specified offset of the
    /// specified block, after obtaining an slock on the block.
    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.concurrency_manager.slock(block)?;

        let idx = self.buffers.get_buffer_idx(block).ok_or_else(|| {
            Error::TransactionAbort {
                txnum: self.txnum,
                block: Some(block.clone()),
            }
        })?;
        let (lock, _) = &*self.buffer_manager.state;
        let mut state = lock.lock().unwrap();
        state.buffer_pool[idx].contents().get_string(offset)
    }

    /// Stores an integer at the specified offset of the specified block,
    /// after obtaining an xlock. If `ok_to_log` is set, the pre-image is
    /// logged first so the write can be undone.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        let idx = self.buffers.get_buffer_idx(block).ok_or_else(|| {
            Error::TransactionAbort {
                txnum: self.txnum,
                block: Some(block.clone()),
            }
        })?;
        let (lock, _) = &*self.buffer_manager.state;
        let mut state = lock.lock().unwrap();

        let mut lsn = -1;
        if ok_to_log {
            lsn = self
                .recovery_manager
                .set_int(&mut state.buffer_pool[idx], offset, val)?;
        }

        state.buffer_pool[idx].contents().set_int(offset, val)?;
        state.buffer_pool[idx].set_modified(self.txnum, lsn)?;
        Ok(())
    }

    /// Stores a string at the specified offset of the specified block,
    /// after obtaining an xlock. If `ok_to_log` is set, the pre-image is
    /// logged first so the write can be undone.
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        let idx = self.buffers.get_buffer_idx(block).ok_or_else(|| {
            Error::TransactionAbort {
                txnum: self.txnum,
                block: Some(block.clone()),
            }
        })?;
        let (lock, _) = &*self.buffer_manager.state;
        let mut state = lock.lock().unwrap();

        let mut lsn = -1;
        if ok_to_log {
            lsn = self
                .recovery_manager
                .set_string(&mut state.buffer_pool[idx], offset, val)?;
        }

        state.buffer_pool[idx].contents().set_string(offset, val)?;
        state.buffer_pool[idx].set_modified(self.txnum, lsn)?;
        Ok(())
    }

    /// Returns the number of blocks in `filename`, after obtaining an slock
    /// on the file's end-of-file sentinel.
    pub fn size(&mut self, filename: &str) -> Result<usize> {
        let dummy_block = BlockId::new(filename, END_OF_FILE);
        self.concurrency_manager.slock(&dummy_block)?;
        self.file_manager.lock().unwrap().length(filename)
    }

    /// Appends a new block to the end of `filename` and returns it, after
    /// obtaining an xlock on the file's end-of-file sentinel.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let dummy_block = BlockId::new(filename, END_OF_FILE);
        self.concurrency_manager.xlock(&dummy_block)?;
        self.file_manager.lock().unwrap().append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.lock().unwrap().block_size()
    }

    pub fn available_buffs(&self) -> usize {
        self.buffer_manager.available()
    }
}
