//! Configuration module for Forum-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and layering environment-provided connection parameters on top of them.
//!
//! # Example
//!
//! ```no_run
//! use forum_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling forum at: {}", config.forum.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{BrokerConfig, Config, ForumConfig, StorageConfig};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
};

pub use validation::validate_forum;
