//! Asynchronous job processing for medrisk analyses.
//!
//! Accepts analysis requests, runs them on a bounded pool of workers with
//! per-job filesystem isolation, tracks lifecycle in an in-memory registry,
//! and persists snapshots to the durable store without blocking submission.
//!
//! The entry point is [`JobQueue`]: construct one per process with
//! [`JobQueue::start`], share it by reference, and shut it down explicitly
//! to drain in-flight work.

pub mod config;
pub mod error;
pub mod queue;
pub mod registry;

mod dispatch;
mod worker;
mod workspace;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, JobView, QueueStats, StatusSource};
pub use registry::{JobRegistry, StatusCounts};
