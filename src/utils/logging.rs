use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if is_json(config) {
        registry.with(fmt::layer().json().with_target(true)).try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    Ok(())
}

fn is_json(config: &LoggingConfig) -> bool {
    config.format.eq_ignore_ascii_case("json")
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::is_json;
    use crate::config::LoggingConfig;

    #[test_case("json" => true)]
    #[test_case("JSON" => true)]
    #[test_case("pretty" => false)]
    #[test_case("" => false)]
    fn format_selection(format: &str) -> bool {
        is_json(&LoggingConfig {
            format: format.to_string(),
            ..LoggingConfig::default()
        })
    }
}
