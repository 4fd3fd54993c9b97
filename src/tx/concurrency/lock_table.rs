use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use tracing::warn;

use crate::{
    error::{Error, Result},
    file::block_id::BlockId,
};

const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(10_000);

#[derive(Debug)]
pub(crate) enum Lock {
    Exclusive,
    Shared(usize),
}

/// The single, process-wide table of locks held across all transactions.
/// Shared with the OS thread, not per-transaction — see
/// [`crate::tx::concurrency::manager::ConcurrencyManager`] for the
/// per-transaction view.
#[derive(Debug, Clone)]
pub struct LockTable {
    state: Arc<(Mutex<HashMap<BlockId, Lock>>, Condvar)>,
    max_wait: Duration,
}

impl LockTable {
    pub fn new() -> Self {
        Self::with_max_wait(DEFAULT_MAX_WAIT)
    }

    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            state: Arc::new((Mutex::new(HashMap::new()), Condvar::new())),
            max_wait,
        }
    }

    /// If an xlock exists when the method is called, then the calling thread
    /// is placed on a wait list until the lock is released. If the thread
    /// remains on the wait list past `max_wait`, an abort error is returned.
    pub fn slock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();

        loop {
            match locks.get(block) {
                Some(Lock::Exclusive) => {
                    let (new_locks, timeout) =
                        cvar.wait_timeout(locks, self.max_wait).unwrap();

                    locks = new_locks;

                    if timeout.timed_out() {
                        warn!(%block, "timed out waiting for shared lock");
                        return Err(Error::LockAbort {
                            block: block.clone(),
                        });
                    }
                }
                Some(Lock::Shared(count)) => {
                    let new_count = *count + 1;
                    locks.insert(block.clone(), Lock::Shared(new_count));
                    return Ok(());
                }
                None => {
                    locks.insert(block.clone(), Lock::Shared(1));
                    return Ok(());
                }
            }
        }
    }

    /// If a lock of any type exists when the method is called, the calling
    /// thread is placed on a wait list until the locks are released. If the
    /// thread remains on the wait list past `max_wait`, an abort error is
    /// returned.
    pub fn xlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();

        loop {
            match locks.get(block) {
                Some(Lock::Shared(count)) if *count > 1 => {
                    let (new_locks, timeout) =
                        cvar.wait_timeout(locks, self.max_wait).unwrap();

                    locks = new_locks;

                    if timeout.timed_out() {
                        warn!(%block, "timed out waiting for exclusive lock");
                        return Err(Error::LockAbort {
                            block: block.clone(),
                        });
                    }
                }
                _ => {
                    locks.insert(block.clone(), Lock::Exclusive);
                    return Ok(());
                }
            }
        }
    }

    /// If this is the last lock on the block, waiting transactions are
    /// notified.
    pub fn unlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();

        match locks.get(block) {
            Some(Lock::Shared(count)) if *count > 1 => {
                let new_count = *count - 1;
                locks.insert(block.clone(), Lock::Shared(new_count));
            }
            _ => {
                locks.remove(block);
                cvar.notify_all();
            }
        }
        Ok(())
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::MutexGuard};

    use crate::{
        file::block_id::BlockId,
        tx::concurrency::lock_table::{Lock, LockTable},
    };

    #[test]
    fn test_slocks() {
        let lock_table = LockTable::new();
        let block = BlockId::new("test.tbl", 1);

        assert!(lock_table.slock(&block).is_ok());
        assert!(lock_table.slock(&block).is_ok());
        assert!(matches!(
            get_locks(&lock_table).get(&block),
            Some(Lock::Shared(2))
        ));

        assert!(lock_table.unlock(&block).is_ok());
        assert!(matches!(
            get_locks(&lock_table).get(&block),
            Some(Lock::Shared(1))
        ));

        assert!(lock_table.unlock(&block).is_ok());
        assert!(get_locks(&lock_table).get(&block).is_none());
    }

    #[test]
    fn test_xlock() {
        let lock_table = LockTable::new();
        let block = BlockId::new("test.tbl", 1);

        assert!(lock_table.xlock(&block).is_ok());
        assert!(matches!(
            get_locks(&lock_table).get(&block),
            Some(Lock::Exclusive)
        ));

        assert!(lock_table.unlock(&block).is_ok());
        assert!(get_locks(&lock_table).get(&block).is_none());
    }

    #[test]
    fn test_xlock_timeout() {
        let lock_table = LockTable::with_max_wait(std::time::Duration::from_millis(50));
        let block = BlockId::new("test.tbl", 1);

        assert!(lock_table.slock(&block).is_ok());
        assert!(lock_table.slock(&block).is_ok());

        assert!(lock_table.xlock(&block).is_err());
    }

    #[test]
    fn test_slock_timeout() {
        let lock_table = LockTable::with_max_wait(std::time::Duration::from_millis(50));
        let block = BlockId::new("test.tbl", 1);

        assert!(lock_table.xlock(&block).is_ok());

        assert!(lock_table.slock(&block).is_err());
    }

    fn get_locks(lock_table: &LockTable) -> MutexGuard<HashMap<BlockId, Lock>> {
        let (lock, _) = &*lock_table.state;
        lock.lock().unwrap()
    }
}
