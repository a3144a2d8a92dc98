//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{fixtures, MockConverter};
//!
//! let converter = MockConverter::new();
//! converter.set_outputs(&["page_001.png", "page_002.png"]).await;
//!
//! let registry = fixtures::registry_with("pdf_to_png", &["pdf"], converter.clone());
//! ```

mod mock_converter;

pub use mock_converter::{MockConverter, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use futures::stream::{self, Stream};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{RetentionConfig, UploadConfig};
    use crate::error::ConversionError;
    use crate::orchestrator::Orchestrator;
    use crate::registry::{ConversionSpec, FormatRegistry};
    use crate::retention::{create_retention_system, RetentionHandle};
    use crate::upload::UploadManager;

    use super::MockConverter;

    /// A registry holding one mock-backed conversion.
    pub fn registry_with(
        identifier: &str,
        extensions: &[&str],
        converter: MockConverter,
    ) -> FormatRegistry {
        let mut registry = FormatRegistry::new();
        // A fresh registry cannot hold a duplicate.
        let _ = registry.register(
            ConversionSpec::library(identifier, extensions),
            Arc::new(converter),
        );
        registry
    }

    /// Upload settings rooted at `staging_root`.
    pub fn upload_config(staging_root: &Path) -> UploadConfig {
        UploadConfig {
            staging_root: staging_root.to_path_buf(),
            ..Default::default()
        }
    }

    /// Orchestrator over `registry` with a running retention worker.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn orchestrator(
        registry: FormatRegistry,
        staging_root: &Path,
        retention_delay: Duration,
    ) -> (Orchestrator, RetentionHandle) {
        let config = RetentionConfig {
            delay_secs: retention_delay.as_secs(),
            sweep_interval_secs: 3600,
            max_age_secs: 3600,
        };
        let (handle, worker) = create_retention_system(&config, staging_root.to_path_buf());
        tokio::spawn(worker.run());
        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            UploadManager::new(&upload_config(staging_root)),
            handle.clone(),
            retention_delay,
        );
        (orchestrator, handle)
    }

    /// A single-chunk upload stream.
    pub fn bytes(data: &[u8]) -> impl Stream<Item = Result<Vec<u8>, ConversionError>> {
        stream::iter(vec![Ok(data.to_vec())])
    }

    /// Number of entries directly under `dir`, zero if it does not exist.
    pub fn entry_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }
}
