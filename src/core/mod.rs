//! Core types for qdispatch.
//!
//! This module contains the job record, its state machine, the handle
//! returned to callers and the envelope pushed onto the broker.

pub mod job;
pub mod job_state;

pub use job::{DEFAULT_QUEUE, Job, JobHandle, QueueMessage};
pub use job_state::{JobState, JobStatus};
