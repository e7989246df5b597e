//! # Structured Logging
//!
//! `tracing-subscriber` setup driven by [`LogConfig`]: an `EnvFilter` built
//! from `RUST_LOG` (falling back to the configured level) and a `fmt` layer in
//! JSON or plain text.

use crate::core::config::LogConfig;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Unknown values fall back to JSON
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "text" | "pretty" | "plain" => Self::Text,
            _ => Self::Json,
        }
    }
}

/// Filter from `RUST_LOG` when set, otherwise from the configured level
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(config: &LogConfig) {
    let filter = env_filter(config);

    let result = match LogFormat::parse(&config.format) {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    match result {
        Ok(()) => info!(level = %config.level, format = %config.format, "Structured logging initialized"),
        Err(_) => warn!("Tracing subscriber already initialized, skipping initialization"),
    }
}
