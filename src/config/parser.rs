use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Environment variables (and a `.env` file, if present) override the
/// connection parameters found in the file; see [`apply_env_overrides`].
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use forum_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Queue: {}", config.broker.queue);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // A missing .env file is the normal case
    let _ = dotenvy::dotenv();

    let content = std::fs::read_to_string(path)?;
    parse_config(&content, |key| std::env::var(key).ok())
}

/// Parses configuration text, applies overrides from `lookup`, and validates
///
/// `[forum]` is left unchecked here; the login validates it.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = toml::from_str(content)?;
    apply_env_overrides(&mut config, lookup);

    // Relative joins such as "login.php" need a directory-style base
    if !config.forum.base_url.is_empty() && !config.forum.base_url.ends_with('/') {
        config.forum.base_url.push('/');
    }

    validate(&config)?;
    Ok(config)
}

/// Overrides connection parameters from the environment
///
/// | Variable | Field |
/// |----------|-------|
/// | `RABBIT_MQ_HOST` | `broker.host` |
/// | `RABBIT_MQ_PORT` | `broker.port` |
/// | `RABBIT_MQ_USER` | `broker.user` |
/// | `RABBIT_MQ_PASS` | `broker.password` |
/// | `FORUM_BASE_URL` | `forum.base-url` |
/// | `FORUM_USERNAME` | `forum.username` |
/// | `FORUM_PASSWORD` | `forum.password` |
///
/// An unparsable `RABBIT_MQ_PORT` is ignored with a warning.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("RABBIT_MQ_HOST") {
        config.broker.host = host;
    }
    if let Some(port) = lookup("RABBIT_MQ_PORT") {
        match port.parse() {
            Ok(port) => config.broker.port = port,
            Err(_) => tracing::warn!("Ignoring invalid RABBIT_MQ_PORT value: {}", port),
        }
    }
    if let Some(user) = lookup("RABBIT_MQ_USER") {
        config.broker.user = user;
    }
    if let Some(password) = lookup("RABBIT_MQ_PASS") {
        config.broker.password = password;
    }
    if let Some(base_url) = lookup("FORUM_BASE_URL") {
        config.forum.base_url = base_url;
    }
    if let Some(username) = lookup("FORUM_USERNAME") {
        config.forum.username = username;
    }
    if let Some(password) = lookup("FORUM_PASSWORD") {
        config.forum.password = password;
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is logged at start-up so runs can be matched to the config they used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
