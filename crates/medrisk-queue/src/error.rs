//! Queue error types.

use medrisk_core::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} already registered")]
    AlreadyRegistered(JobId),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("queue is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Request(#[from] medrisk_core::Error),

    #[error("store error: {0}")]
    Store(#[from] medrisk_db::StoreError),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
