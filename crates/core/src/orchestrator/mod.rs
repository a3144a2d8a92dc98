//! Conversion orchestrator.
//!
//! Drives each request through
//! `Received -> Validated -> Staged -> Converting -> Packaged -> Delivered`,
//! with every state able to exit to `Failed`:
//! - **Validation** happens per file before it is written
//! - **Conversion** runs the registered converter; panics and backend errors
//!   become [`ConversionError::ConversionFailed`](crate::error::ConversionError)
//! - **Packaging** zips multi-output results
//!
//! The job directory is handed to the retention manager exactly once, when
//! the job fails, is abandoned, or its artifact is released.

mod job;
mod package;
mod runner;
mod state;
mod types;

pub use job::ConversionJob;
pub use package::{archive_name, ARCHIVE_SUFFIX};
pub use runner::{BackendStatus, Orchestrator};
pub use state::JobState;
pub use types::{content_type_for, Artifact, ConversionResult, DeliveryGuard};
