use thiserror::Error;

use crate::file::block_id::BlockId;

/// The single error type for every fallible operation in this crate.
///
/// Unlike a SQL-facing layer, callers here are expected to match on the
/// variant: a `BufferAbort` or `LockAbort` means "retry or roll back", while
/// `Io`/`LogCorrupt` are fatal to the whole process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer abort: no frame available for {block}")]
    BufferAbort { block: BlockId },

    #[error("lock abort: could not acquire lock on {block}")]
    LockAbort { block: BlockId },

    #[error("log corrupt: {0}")]
    LogCorrupt(String),

    #[error("unknown log operation code: {0}")]
    UnknownLogOperation(i32),

    #[error("transaction {txnum} abort: buffer not pinned for {block:?}")]
    TransactionAbort { txnum: i32, block: Option<BlockId> },
}

pub type Result<T> = std::result::Result<T, Error>;
