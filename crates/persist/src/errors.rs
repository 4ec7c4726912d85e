//! Errors returned by this crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("corrupt string dictionary entry at offset {0}")]
    CorruptStringDict(u64),

    #[error("corrupt method offset record at index {0}")]
    CorruptOffsetRecord(u64),

    #[error("corrupt graph record at offset {0}: {1}")]
    CorruptGraphRecord(u64, String),

    #[error("graph record references unknown node index {0}")]
    DanglingNodeRef(i64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
