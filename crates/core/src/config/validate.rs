use super::{types::Config, ConfigError};

/// FFmpeg log levels that still print the input `Duration:` header, which
/// progress reporting depends on.
const PROGRESS_LOG_LEVELS: &[&str] = &["info", "verbose", "debug", "trace"];

/// Validate configuration
/// Currently validates:
/// - Engine core location is not empty
/// - Server port is not 0
/// - Upload limit is not 0
/// - Engine log level is verbose enough to report progress
/// - Notification buffer is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.core_path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.core_path cannot be empty".to_string(),
        ));
    }

    if !PROGRESS_LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "engine.log_level must be one of {:?} (got {:?})",
            PROGRESS_LOG_LEVELS, config.engine.log_level
        )));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.server.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "server.max_upload_bytes cannot be 0".to_string(),
        ));
    }

    // mpsc::channel panics on a zero capacity
    if config.notifications.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "notifications.buffer_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}
