/// Diagnostic logging to stderr; stdout is reserved for the status line
use tracing_subscriber::EnvFilter;

/// Environment variable taking precedence over `RUST_LOG`.
pub const LOG_ENV: &str = "CHECK_IOSTAT_LOG";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level used when no filter is set in the environment
    pub level: String,
}

impl LogConfig {
    pub fn new(default_level: &str) -> Self {
        Self {
            level: default_level.to_string(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// `CHECK_IOSTAT_LOG`, then `RUST_LOG`, then the configured level.
    pub fn env_filter(&self) -> EnvFilter {
        for var in [LOG_ENV, "RUST_LOG"] {
            if let Ok(filter) = EnvFilter::try_from_env(var) {
                return filter;
            }
        }
        EnvFilter::new(&self.level)
    }
}

pub fn init_logging(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_level_overrides_default() {
        let config = LogConfig::new("warn").with_level("debug");
        assert_eq!(config.level, "debug");
    }
}
