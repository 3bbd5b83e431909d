//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, LogOutput, LoggingConfig, TetherConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TetherConfig) -> ConfigResult<()> {
    validate_connection_config(&config.connection)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates connection settings.
pub fn validate_connection_config(config: &ConnectionConfig) -> ConfigResult<()> {
    if config.url.is_empty() {
        return Err(ConfigError::missing_field("connection.url"));
    }
    validate_url(&config.url)?;

    if config.attempts_per_candidate == 0 {
        return Err(ConfigError::validation(
            "attempts_per_candidate must be at least 1",
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "request_timeout_secs must be greater than 0",
        ));
    }

    for name in config.headers.keys() {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid header name: '{name}'"
            )));
        }
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates the endpoint URL; transports derive their own schemes from it.
fn validate_url(url: &str) -> ConfigResult<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "missing scheme"));
    };

    if !matches!(scheme, "http" | "https") {
        return Err(ConfigError::invalid_url(
            url,
            format!("unsupported scheme '{scheme}', expected http or https"),
        ));
    }

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }

    Ok(())
}
