//! Execution sandbox for out-of-process conversion tools.
//!
//! Every external tool invocation goes through [`ProcessSandbox::run`], which
//! gives it:
//!
//! - a per-job working directory (created if missing)
//! - a hard wall-clock timeout, after which the whole process group is killed
//! - a bounded capture of stderr for diagnostics
//!
//! Nothing is retried here. A failed run is reported once and the caller
//! decides what to do with it.

mod error;
mod process;

pub use error::SandboxError;
pub use process::{ProcessSandbox, SandboxCommand, SandboxOutput};
