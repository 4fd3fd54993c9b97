use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{
    buffer::{buffer::Buffer, manager::BufferManager},
    error::{Error, Result},
    log::manager::LogManager,
    tx::transaction::Transaction,
    Lsn,
};

use super::log_record::{
    create_log_record, CheckpointRecord, CommitRecord, LogOperation, RollbackRecord, SetIntRecord,
    SetStringRecord, StartRecord,
};

/// Each transaction owns one of these. It is responsible for writing the
/// transaction's log records (START/SET*/COMMIT/ROLLBACK) and, at system
/// startup, for undoing whatever the log says was left unfinished.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    log_manager: Arc<Mutex<LogManager>>,
    buffer_manager: Arc<BufferManager>,
    txnum: i32,
}

impl RecoveryManager {
    pub fn new(
        log_manager: Arc<Mutex<LogManager>>,
        buffer_manager: Arc<BufferManager>,
        txnum: i32,
    ) -> Result<Self> {
        StartRecord::write_to_log(Arc::clone(&log_manager), txnum)?;
        Ok(Self {
            log_manager,
            buffer_manager,
            txnum,
        })
    }

    /// Writes a commit record to the log and flushes it to disk, after
    /// flushing every buffer this transaction modified.
    pub fn commit(&self) -> Result<()> {
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = CommitRecord::write_to_log(Arc::clone(&self.log_manager), self.txnum)?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        debug!(txnum = self.txnum, "transaction committed");
        Ok(())
    }

    /// Undoes this transaction's writes, then writes and flushes a
    /// rollback record.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        self.do_rollback(tx)?;
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = RollbackRecord::write_to_log(Arc::clone(&self.log_manager), self.txnum)?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        debug!(txnum = self.txnum, "transaction rolled back");
        Ok(())
    }

    /// Recovers uncompleted transactions from the log, then writes a
    /// quiescent checkpoint record and flushes it to disk. Returns the
    /// highest transaction number observed anywhere in the log, so the
    /// caller can seed the process-wide transaction counter past it.
    pub fn recover(&self, tx: &mut Transaction) -> Result<i32> {
        let max_txnum = self.do_recover(tx)?;
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = CheckpointRecord::write_to_log(Arc::clone(&self.log_manager))?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        Ok(max_txnum)
    }

    /// Writes a SETINT record to the log and returns its LSN.
    pub fn set_int(&self, buf: &mut Buffer, offset: usize, _: i32) -> Result<Lsn> {
        let old_val = buf.contents().get_int(offset)?;
        if let Some(block) = buf.block() {
            return SetIntRecord::write_to_log(
                Arc::clone(&self.log_manager),
                self.txnum,
                block,
                offset,
                old_val,
            );
        }
        Err(Error::TransactionAbort {
            txnum: self.txnum,
            block: None,
        })
    }

    /// Writes a SETSTRING record to the log and returns its LSN.
    pub fn set_string(&self, buf: &mut Buffer, offset: usize, _: &str) -> Result<Lsn> {
        let old_val = buf.contents().get_string(offset)?;
        if let Some(block) = buf.block() {
            return SetStringRecord::write_to_log(
                Arc::clone(&self.log_manager),
                self.txnum,
                block,
                offset,
                &old_val,
            );
        }
        Err(Error::TransactionAbort {
            txnum: self.txnum,
            block: None,
        })
    }

    /// Iterates the log back to this transaction's START record, undoing
    /// every one of its SET records along the way.
    fn do_rollback(&self, tx: &mut Transaction) -> Result<()> {
        let mut iter = self.log_manager.lock().unwrap().iterator()?;
        while iter.has_next() {
            if let Some(bytes) = iter.next() {
                let rec = create_log_record(bytes)?;
                if rec.tx_number() == self.txnum {
                    if rec.op() == LogOperation::Start {
                        return Ok(());
                    }

                    rec.undo(tx)?;
                }
            }
        }

        Ok(())
    }

    /// Undoes every log record belonging to a transaction that neither
    /// committed nor rolled back, stopping at the most recent checkpoint
    /// (or the start of the log). Returns the highest transaction number
    /// encountered, committed or not, so the process-wide counter can be
    /// seeded past it on restart.
    fn do_recover(&self, tx: &mut Transaction) -> Result<i32> {
        let mut finished_txs = vec![];
        let mut max_txnum = 0;
        let mut iter = self.log_manager.lock().unwrap().iterator()?;
        while iter.has_next() {
            if let Some(bytes) = iter.next() {
                let rec = create_log_record(bytes)?;
                max_txnum = max_txnum.max(rec.tx_number());
                match rec.op() {
                    LogOperation::Checkpoint => return Ok(max_txnum),
                    LogOperation::Commit | LogOperation::Rollback => {
                        finished_txs.push(rec.tx_number())
                    }
                    _ => {
                        if !finished_txs.contains(&rec.tx_number()) {
                            rec.undo(tx)?;
                        }
                    }
                }
            }
        }
        Ok(max_txnum)
    }
}
