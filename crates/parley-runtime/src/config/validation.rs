//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConversationConfig, ListenConfig, LogOutput, LoggingConfig, ParleyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_listen_config(&config.listen)?;
    validate_conversation_config(&config.conversation)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module name: {module:?}"
        )));
    }

    Ok(())
}

fn validate_listen_config(listen: &ListenConfig) -> ConfigResult<()> {
    if listen.poll_interval_ms == 0 {
        return Err(ConfigError::validation(
            "listen.poll_interval_ms must be greater than 0",
        ));
    }

    if listen.max_concurrent_sessions == 0 {
        return Err(ConfigError::validation(
            "listen.max_concurrent_sessions must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_conversation_config(conversation: &ConversationConfig) -> ConfigResult<()> {
    if conversation.idle_timeout_secs == Some(0) {
        return Err(ConfigError::validation(
            "conversation.idle_timeout_secs must be greater than 0 when set",
        ));
    }

    if conversation.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "conversation.sweep_interval_secs must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = ParleyConfig::default();
        config.listen.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ParleyConfig::default();
        config.listen.max_concurrent_sessions = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ParleyConfig::default();
        config.conversation.sweep_interval_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = ParleyConfig::default();
        config.conversation.idle_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = ParleyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("parley.log"));
        assert!(validate_config(&config).is_ok());
    }
}
