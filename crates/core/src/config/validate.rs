use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Upload ceiling and merge bounds are usable
/// - Sandbox timeouts are non-zero
/// - The age sweep cannot catch a job still inside its longest tool timeout
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let uploads = &config.uploads;
    if uploads.max_file_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "uploads.max_file_bytes cannot be 0".to_string(),
        ));
    }
    if uploads.min_merge_files < 2 {
        return Err(ConfigError::ValidationError(
            "uploads.min_merge_files must be at least 2".to_string(),
        ));
    }
    if uploads.min_merge_files > uploads.max_merge_files {
        return Err(ConfigError::ValidationError(format!(
            "uploads.min_merge_files ({}) exceeds uploads.max_merge_files ({})",
            uploads.min_merge_files, uploads.max_merge_files
        )));
    }

    let sandbox = &config.sandbox;
    if sandbox.audio_timeout_secs == 0
        || sandbox.video_timeout_secs == 0
        || sandbox.document_timeout_secs == 0
    {
        return Err(ConfigError::ValidationError(
            "sandbox timeouts must be greater than 0".to_string(),
        ));
    }

    if config.retention.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "retention.sweep_interval_secs cannot be 0".to_string(),
        ));
    }
    if config.retention.max_age_secs <= sandbox.longest_timeout_secs() {
        return Err(ConfigError::ValidationError(format!(
            "retention.max_age_secs ({}) must exceed the longest sandbox timeout ({})",
            config.retention.max_age_secs,
            sandbox.longest_timeout_secs()
        )));
    }

    if config.pdf.render_scale <= 0.0 {
        return Err(ConfigError::ValidationError(
            "pdf.render_scale must be positive".to_string(),
        ));
    }

    Ok(())
}
