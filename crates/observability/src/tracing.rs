//! Subscriber configuration.

use tracing_subscriber::EnvFilter;

/// Selects the output format.
pub const LOG_FORMAT: &str = "PANTRY_LOG_FORMAT";

const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable, for local runs.
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset or unparsable.
    pub default_directive: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let format = std::env::var(LOG_FORMAT)
            .map(|raw| LogFormat::parse(&raw))
            .unwrap_or_default();
        Self {
            format,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install a global fmt subscriber. Returns `false` if one was already set.
pub fn init_with(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(false);

    match config.format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .try_init()
            .is_ok(),
        LogFormat::Pretty => builder.pretty().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_json() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" TEXT "), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Json);
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = LogConfig::default();
        init_with(&config);
        assert!(!init_with(&config));
    }
}
