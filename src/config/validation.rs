use crate::config::types::{BrokerConfig, Config, ForumConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the sections every command uses
///
/// `[forum]` is checked separately by [`validate_forum`] when a command logs
/// in, so `persist`, `stats` and `check` load configs that omit it.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_broker_config(&config.broker)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates forum site and login configuration
pub fn validate_forum(config: &ForumConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", config.base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use HTTP or HTTPS",
            config.base_url
        )));
    }

    require_non_empty("forum.username", &config.username)?;
    require_non_empty("forum.password", &config.password)?;
    require_non_empty("forum.user-agent", &config.user_agent)?;
    require_non_empty("forum.page-marker", config.page_marker.trim())?;

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_attempts < 1 || config.connect_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "connect-attempts must be between 1 and 10, got {}",
            config.connect_attempts
        )));
    }

    if config.max_pages == 0 {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates broker configuration
fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    require_non_empty("broker.host", &config.host)?;
    require_non_empty("broker.exchange", &config.exchange)?;
    require_non_empty("broker.queue", &config.queue)?;
    require_non_empty("broker.routing-key", &config.routing_key)?;

    if config.port == 0 {
        return Err(ConfigError::Validation(
            "broker.port must be non-zero".to_string(),
        ));
    }

    // Clients may not declare exchanges in the reserved amq. namespace
    if config.exchange.starts_with("amq.") {
        return Err(ConfigError::Validation(format!(
            "broker.exchange '{}' uses the reserved 'amq.' prefix",
            config.exchange
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    require_non_empty("storage.database-path", &config.database_path)
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}
