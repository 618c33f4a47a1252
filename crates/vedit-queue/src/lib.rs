//! Redis Streams job queue and job records.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with per-job dedup
//! - Consumer-group consumption, ack, dead-lettering and stale claims
//! - The [`JobStore`] for job and project records

pub mod error;
pub mod job;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use job::EditJob;
pub use queue::{JobDispatch, JobQueue, QueueConfig};
pub use store::{JobStore, MemoryJobStore, RedisJobStore};
