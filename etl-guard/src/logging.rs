//! Logging configuration for etl-guard.
//!
//! Transformers log through `tracing`: one `info!` summary per batch, `debug!`
//! for skipped fields and methods, `warn!` for degenerate inputs. This module
//! holds the knobs that bound that output and a helper to install a
//! subscriber in binaries and tests.

/// Logging configuration for etl-guard transformers.
///
/// Controls how much per-record detail ends up in log lines. Batch
/// summaries are always emitted at `info`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log one line per flagged or filtered record
    pub log_record_details: bool,
    /// Whether to include transformer counters in batch summaries
    pub log_stats: bool,
    /// Maximum length for logged field values
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_record_details: false,
            log_stats: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            log_record_details: true,
            log_stats: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration for production.
    pub fn production() -> Self {
        Self {
            log_record_details: false,
            log_stats: false,
            max_field_length: 128,
        }
    }

    /// Creates a balanced configuration suitable for most use cases.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Truncates a value to this configuration's field length.
    pub fn truncate<'a>(&self, value: &'a str) -> std::borrow::Cow<'a, str> {
        if value.len() <= self.max_field_length {
            std::borrow::Cow::Borrowed(value)
        } else {
            std::borrow::Cow::Owned(truncate_field(value, self.max_field_length))
        }
    }
}

/// Truncates a string to the maximum field length if needed.
///
/// Cuts on a character boundary at or below `max_length` bytes.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut end = max_length;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Utilities for installing a `tracing` subscriber.
pub mod setup {
    use tracing::Level;

    /// Configuration for the etl-guard logging setup.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for the application
        pub level: Level,
        /// Log level for etl-guard components specifically
        pub etl_level: Level,
        /// Whether to use JSON output format
        pub json_format: bool,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                etl_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// Configuration for production use: JSON lines, `info` for the crate.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                etl_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                etl_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_etl_level(mut self, level: Level) -> Self {
            self.etl_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            if let Some(ref filter) = self.env_filter {
                filter.clone()
            } else {
                format!(
                    "{},etl_guard={}",
                    self.level.as_str().to_lowercase(),
                    self.etl_level.as_str().to_lowercase()
                )
            }
        }
    }

    /// Initializes a global subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured filter.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use etl_guard::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}
