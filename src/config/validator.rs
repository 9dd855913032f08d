use std::collections::HashSet;

use secrecy::ExposeSecret;
use thiserror::Error;

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "web.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.web.key_enabled {
            let has_key = self
                .web
                .key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().is_empty());
            if !has_key {
                return Err(ConfigError::InvalidConfig(
                    "web.key must be set when web.key_enabled is true".to_string(),
                ));
            }
        }

        if self.database.sqlite_path().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.filename cannot be empty".to_string(),
            ));
        }

        if self.database.operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.operation_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.ledger.cooldown_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "ledger.cooldown_secs must be greater than 0".to_string(),
            ));
        }

        if self.ledger.rate_limit_prune_secs < self.ledger.cooldown_secs {
            return Err(ConfigError::InvalidConfig(
                "ledger.rate_limit_prune_secs cannot be shorter than ledger.cooldown_secs"
                    .to_string(),
            ));
        }

        if self.ledger.top_limit == 0 || self.ledger.kind_top_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "ledger top limits must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for emoji in self
            .emoji
            .positive
            .iter()
            .chain(&self.emoji.negative)
            .chain(&self.emoji.whale)
        {
            if !seen.insert(emoji.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "emoji {emoji} is listed in more than one class"
                )));
            }
        }

        Ok(())
    }
}
