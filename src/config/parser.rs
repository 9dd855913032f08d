use super::ConfigError;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub emoji: EmojiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub key_enabled: bool,
    #[serde(default)]
    pub key: Option<SecretString>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            key_enabled: false,
            key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(alias = "url", default = "default_database_filename")]
    pub filename: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            filename: default_database_filename(),
            busy_timeout_ms: default_busy_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn sqlite_path(&self) -> String {
        self.filename
            .strip_prefix("sqlite://")
            .unwrap_or(&self.filename)
            .to_string()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,
    #[serde(default = "default_kind_top_limit")]
    pub kind_top_limit: usize,
    #[serde(default = "default_rate_limit_prune_secs")]
    pub rate_limit_prune_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            top_limit: default_top_limit(),
            kind_top_limit: default_kind_top_limit(),
            rate_limit_prune_secs: default_rate_limit_prune_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn rate_limit_prune_after(&self) -> Duration {
        Duration::from_secs(self.rate_limit_prune_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmojiConfig {
    #[serde(default = "default_positive_emoji")]
    pub positive: Vec<String>,
    #[serde(default = "default_negative_emoji")]
    pub negative: Vec<String>,
    #[serde(default = "default_whale_emoji")]
    pub whale: Vec<String>,
}

impl Default for EmojiConfig {
    fn default() -> Self {
        Self {
            positive: default_positive_emoji(),
            negative: default_negative_emoji(),
            whale: default_whale_emoji(),
        }
    }
}

/// Chat-side identity used when parsing commands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads `path` if it exists, otherwise starts from defaults. Environment
    /// overrides are applied either way.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("WEB_PORT") {
            if let Ok(port) = value.parse() {
                self.web.port = port;
            }
        }
        if let Ok(value) = std::env::var("KEY") {
            self.web.key = Some(SecretString::from(value));
        }
        if let Ok(value) = std::env::var("KEY_ENABLED") {
            self.web.key_enabled = parse_enabled_flag(&value);
        }
        if let Ok(value) = std::env::var("DATABASE_PATH") {
            self.database.filename = value;
        }
        if let Ok(value) = std::env::var("BOT_USERNAME") {
            self.bot.username = Some(value).filter(|name| !name.is_empty());
        }
    }
}

/// Anything except an empty string or `false` turns the flag on.
fn parse_enabled_flag(value: &str) -> bool {
    !value.is_empty() && value != "false"
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_filename() -> String {
    "./database.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_cooldown_secs() -> u64 {
    15
}

fn default_top_limit() -> usize {
    10
}

fn default_kind_top_limit() -> usize {
    9
}

fn default_rate_limit_prune_secs() -> u64 {
    600
}

fn default_positive_emoji() -> Vec<String> {
    ["👍", "🔥", "❤️", "👏", "💯"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_negative_emoji() -> Vec<String> {
    ["🤡", "💩", "🤮", "👎"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_whale_emoji() -> Vec<String> {
    vec!["🐳".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::{Config, parse_enabled_flag};
    use crate::config::ConfigError;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_yaml("").expect("defaults");
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.ledger.cooldown_secs, 15);
        assert_eq!(config.ledger.top_limit, 10);
        assert_eq!(config.ledger.kind_top_limit, 9);
        assert_eq!(config.database.sqlite_path(), "./database.db");
        assert!(config.emoji.positive.contains(&"👍".to_string()));
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn yaml_sections_override_defaults() {
        let mut file = NamedTempFile::new().expect("temp config");
        writeln!(
            file,
            r#"
web:
  port: 9100
  key_enabled: true
  key: "s3cret"
database:
  filename: "sqlite:///tmp/rep.db"
  operation_timeout_ms: 250
ledger:
  cooldown_secs: 30
emoji:
  whale: ["🐳", "🐋"]
bot:
  username: repbot
"#
        )
        .expect("write config");

        let config = Config::from_yaml(&std::fs::read_to_string(file.path()).unwrap())
            .expect("parse config");
        config.validate().expect("valid config");

        assert_eq!(config.web.port, 9100);
        assert_eq!(
            config.web.key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("s3cret".to_string())
        );
        assert_eq!(config.database.sqlite_path(), "/tmp/rep.db");
        assert_eq!(config.database.operation_timeout().as_millis(), 250);
        assert_eq!(config.ledger.cooldown().as_secs(), 30);
        assert_eq!(config.emoji.whale.len(), 2);
        assert_eq!(config.emoji.negative.len(), 4);
        assert_eq!(config.bot.username.as_deref(), Some("repbot"));
    }

    #[test]
    fn key_enabled_without_key_is_rejected() {
        let config = Config::from_yaml("web:\n  key_enabled: true\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn emoji_in_two_classes_is_rejected() {
        let config = Config::from_yaml("emoji:\n  positive: [\"👍\"]\n  negative: [\"👍\"]\n")
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cooldown_is_rejected() {
        let config = Config::from_yaml("ledger:\n  cooldown_secs: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn prune_window_shorter_than_cooldown_is_rejected() {
        let config =
            Config::from_yaml("ledger:\n  cooldown_secs: 60\n  rate_limit_prune_secs: 30\n")
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let result = Config::from_yaml("web: [unterminated");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test_case("" => false)]
    #[test_case("false" => false)]
    #[test_case("true" => true)]
    #[test_case("1" => true)]
    #[test_case("yes" => true)]
    fn enabled_flag_parsing(value: &str) -> bool {
        parse_enabled_flag(value)
    }
}
