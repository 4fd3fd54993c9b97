use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    file::{block_id::BlockId, manager::FileManager},
    log::manager::LogManager,
};

use super::buffer::Buffer;

const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(10_000);

#[derive(Debug)]
pub struct BufferPoolState {
    pub buffer_pool: Vec<Buffer>,
    num_available: usize,
    clock_hand: usize,
}

/// Owns the fixed-size pool of [`Buffer`] frames and mediates every pin,
/// blocking a caller when no frame is free until one is unpinned or
/// `max_wait` elapses.
#[derive(Debug)]
pub struct BufferManager {
    pub state: Arc<(Mutex<BufferPoolState>, Condvar)>,
    max_wait: Duration,
}

impl BufferManager {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        num_buffers: usize,
    ) -> Self {
        Self::with_max_wait(file_manager, log_manager, num_buffers, DEFAULT_MAX_WAIT)
    }

    pub fn with_max_wait(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        num_buffers: usize,
        max_wait: Duration,
    ) -> Self {
        let buffers = (0..num_buffers)
            .map(|_| Buffer::new(Arc::clone(&file_manager), Arc::clone(&log_manager)))
            .collect();

        let state = BufferPoolState {
            buffer_pool: buffers,
            num_available: num_buffers,
            clock_hand: 0,
        };

        Self {
            state: Arc::new((Mutex::new(state), Condvar::new())),
            max_wait,
        }
    }

    pub fn available(&self) -> usize {
        let (lock, _) = &*self.state;
        let state = lock.lock().unwrap();
        state.num_available
    }

    pub fn unpin(&self, idx: usize) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        state.buffer_pool[idx].unpin();
        if !state.buffer_pool[idx].is_pinned() {
            state.num_available += 1;
            cvar.notify_one();
        }
        Ok(())
    }

    pub fn pin(&self, block: &BlockId) -> Result<usize> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        loop {
            if let Some(idx) = self.try_to_pin(block, &mut state) {
                return Ok(idx);
            }

            let (new_state, timeout) = cvar.wait_timeout(state, self.max_wait).unwrap();
            state = new_state;

            if timeout.timed_out() {
                warn!(%block, "timed out waiting for a free buffer");
                return Err(Error::BufferAbort {
                    block: block.clone(),
                });
            }
        }
    }

    pub fn flush_all(&self, txnum: i32) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        let result = state
            .buffer_pool
            .iter_mut()
            .filter(|buf| buf.modifying_tx() == txnum)
            .try_for_each(|buf| buf.flush());

        cvar.notify_all();
        result
    }

    fn try_to_pin<'a>(&self, block: &'a BlockId, state: &'a mut BufferPoolState) -> Option<usize> {
        if let Some(idx) = self.find_existing_buffer(block, state) {
            if !state.buffer_pool[idx].is_pinned() {
                state.num_available -= 1;
            }
            state.buffer_pool[idx].pin();
            return Some(idx);
        }

        if let Some(idx) = self.find_victim(state) {
            debug!(%block, idx, "assigning buffer frame to block");
            state.buffer_pool[idx].assign_to_block(block).unwrap();
            state.num_available -= 1;
            state.buffer_pool[idx].pin();
            return Some(idx);
        }

        None
    }

    fn find_existing_buffer<'a>(
        &self,
        block: &'a BlockId,
        state: &'a BufferPoolState,
    ) -> Option<usize> {
        state
            .buffer_pool
            .iter()
            .enumerate()
            .find(|(_, buffer)| buffer.block() == Some(block))
            .map(|(idx, _)| idx)
    }

    /// Clock (second-chance) victim selection: sweep the pool starting at
    /// `clock_hand`, skipping pinned frames. An unpinned frame whose usage
    /// bit is set gets one reprieve (the bit is cleared and the hand moves
    /// on); the first unpinned frame found with a clear usage bit is
    /// evicted. At most two full sweeps are made before giving up, which
    /// bounds the cost of an all-pinned pool.
    fn find_victim(&self, state: &mut BufferPoolState) -> Option<usize> {
        let len = state.buffer_pool.len();
        if len == 0 {
            return None;
        }

        for _ in 0..(2 * len) {
            let idx = state.clock_hand;
            state.clock_hand = (state.clock_hand + 1) % len;

            let buf = &mut state.buffer_pool[idx];
            if buf.is_pinned() {
                continue;
            }

            if buf.usage_count() {
                buf.clear_usage();
                continue;
            }

            return Some(idx);
        }

        None
    }
}
