//! Upload manager: validates client filenames and stages uploaded bytes
//! into job-scoped directories under the staging root.

mod filename;
mod manager;

pub use filename::{sanitize_stem, ClientFilename};
pub use manager::{JobPaths, UploadManager, UploadedAsset};
