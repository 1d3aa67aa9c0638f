//! Logging initialization

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// Initialize the logging system
///
/// Builds an EnvFilter from `RUST_LOG` or the configured level, applies
/// per-module overrides, and installs a stdout layer plus an optional
/// daily-rolling file layer. The returned guard must be held for the
/// process lifetime to flush the file writer.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    for (module, level) in &config.overrides {
        if let Ok(directive) = format!("{}={}", module, level).parse() {
            filter = filter.add_directive(directive);
        } else {
            eprintln!("Invalid log directive: {}={}", module, level);
        }
    }

    let is_json = config.format.to_lowercase() == "json";

    let stdout_layer = if is_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = if config.dir.is_empty() {
        (None, None)
    } else {
        let file_appender = tracing_appender::rolling::daily(&config.dir, "actionbus.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = if is_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        };
        (Some(layer), Some(guard))
    };

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
