use std::collections::HashMap;

use crate::{error::Result, file::block_id::BlockId};

use super::lock_table::LockTable;

#[derive(Debug)]
pub(crate) enum Lock {
    Exclusive,
    Shared,
}

/// Each transaction owns one of these. It tracks which locks the
/// transaction itself already holds (so repeated requests are free) and
/// forwards first-time requests to the shared [`LockTable`].
///
/// Enforces the lock protocol: acquire a shared lock before reading a
/// block, an exclusive lock before writing one, and release everything
/// only at commit or rollback.
#[derive(Debug)]
pub struct ConcurrencyManager {
    lock_table: LockTable,
    locks: HashMap<BlockId, Lock>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: LockTable) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    pub fn slock(&mut self, block: &BlockId) -> Result<()> {
        match self.locks.get(block) {
            Some(Lock::Exclusive) | Some(Lock::Shared) => Ok(()),
            None => {
                self.lock_table.slock(block)?;
                self.locks.insert(block.clone(), Lock::Shared);
                Ok(())
            }
        }
    }

    pub fn xlock(&mut self, block: &BlockId) -> Result<()> {
        match self.locks.get(block) {
            Some(Lock::Exclusive) => Ok(()),
            _ => {
                self.slock(block)?;
                self.lock_table.xlock(block)?;
                self.locks.insert(block.clone(), Lock::Exclusive);
                Ok(())
            }
        }
    }

    pub fn release(&mut self) -> Result<()> {
        for block in self.locks.keys() {
            self.lock_table.unlock(block)?;
        }
        self.locks.clear();
        Ok(())
    }
}
