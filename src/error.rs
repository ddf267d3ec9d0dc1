//! Engine-wide error type.
//!
//! One variant per failure domain named in the error handling design: pool
//! and queue errors are locally recoverable, network errors downgrade to
//! plan failure once retries are exhausted, and `FatalEngineError` escalates
//! to process exit via [`crate::engine::NodeEngine::on_fatal_exception`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("buffer pool exhausted: no segment available within deadline")]
    PoolExhausted,

    #[error("task queue full, retry after backoff")]
    QueueFull,

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("partition not found: {0:?}")]
    PartitionNotFound(String),

    #[error("channel closed, buffering until reconnect")]
    ChannelClosed,

    #[error("connect timeout after {0} attempts")]
    ConnectTimeout(u32),

    #[error("operator handler fault: {0}")]
    HandlerFault(String),

    #[error("fatal engine error: {0}")]
    FatalEngineError(String),

    #[error("query not found: {0}")]
    QueryNotFound(u64),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether this error is fatal to the whole node engine, as opposed to a
    /// single plan or task.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::FatalEngineError(_))
    }
}
