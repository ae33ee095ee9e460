use std::fs;
use std::path::Path;

use crate::config::models::Config;
use crate::error::ConfigError;

pub fn parse_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_str(&content)
}

pub fn parse_str(content: &str) -> Result<Config, ConfigError> {
    // An empty document deserializes to unit, not to a map.
    let config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

    if let Err(e) = config.listen_addr() {
        return invalid(format!("{}:{} is not a socket address: {}", config.host, config.port, e));
    }
    if config.workers == 0 {
        return invalid("workers must be at least 1".into());
    }
    if config.max_connections == 0 {
        return invalid("max_connections must be at least 1".into());
    }
    if config.max_connections >= (u32::MAX - 1) as usize {
        return invalid(format!("max_connections {} is too large", config.max_connections));
    }
    if config.read_buffer_size == 0 || config.write_buffer_size == 0 {
        return invalid("buffer sizes must be non-zero".into());
    }
    if config.events_capacity == 0 {
        return invalid("events_capacity must be non-zero".into());
    }
    let root_len = config.document_root.as_os_str().len();
    if root_len == 0 {
        return invalid("document_root must not be empty".into());
    }
    if root_len + 1 >= config.max_path_len {
        return invalid(format!(
            "document_root ({} bytes) leaves no room under max_path_len {}",
            root_len, config.max_path_len
        ));
    }
    Ok(())
}
