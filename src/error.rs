//! Error types for blocktail.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlocktailError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification channel error: {0}")]
    Notify(#[source] std::io::Error),

    #[error("Notification channel is closed")]
    NotifyClosed,

    #[error("Record unreadable: {0}")]
    RecordIo(#[source] std::io::Error),

    #[error("Record too short: {0} bytes")]
    RecordTooShort(usize),

    #[error("Unsupported record version: {0}")]
    RecordVersion(u8),

    #[error("Record checksum mismatch")]
    RecordChecksum,
}
