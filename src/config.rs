pub use self::parser::{Config, DatabaseConfig, EmojiConfig, LoggingConfig, WebConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
