//! Retention manager: removes job directories once their artifact has been
//! delivered, once the retention delay expires, or when a job fails.
//!
//! A stale-directory sweep catches anything a crashed process left behind.

mod handle;
mod worker;

pub use handle::{RetentionCommand, RetentionHandle, RetentionPolicy};
pub use worker::{create_retention_system, RetentionWorker};
