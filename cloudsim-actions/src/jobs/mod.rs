//! Reusable jobs
//!
//! Generic building blocks that applications specialize with
//! [`Job::extend`](crate::job::Job::extend).

pub mod wait;

pub use wait::{WaitConfig, WaitError, wait_until};
