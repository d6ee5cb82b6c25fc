use anyhow::Result;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{parse_level, LoggingConfig};

/// Install the global subscriber.
///
/// Console output goes to stderr so that stdout stays free for run output.
/// `RUST_LOG` overrides the configured level. The returned guard must be kept
/// alive for the file layer to flush.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = parse_level(&config.log_level).unwrap_or(tracing::Level::INFO);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("mirror={level},mirror_cli={level}", level = level))
    });

    let (console_plain, console_json) = if config.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_target(false).with_writer(std::io::stderr)), None)
    };

    let (file_layer, guard) = if let Some(log_path) = &config.log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file_appender = rolling::never(
            log_path.parent().unwrap_or_else(|| std::path::Path::new(".")),
            log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("mirror.log")),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .json()
            .with_current_span(true)
            .with_span_list(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .init();

    Ok(guard)
}
