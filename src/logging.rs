//! Tracing setup: console layer on stderr plus a daily-rolling file under
//! `logs/`. The level comes from `[logging]` config, with `RUST_LOG` as the
//! override when no config is given.

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::config::AppConfig;
use crate::Result;

/// Initialize logging with defaults (`RUST_LOG` or `info`).
pub fn init_logging() -> Result<()> {
    init_logging_with_config(None)
}

/// Initialize the console and file logging layers.
///
/// The file writer guard is intentionally leaked so buffered log lines
/// survive for the whole process lifetime.
pub fn init_logging_with_config(config: Option<&AppConfig>) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let level = config.map_or("info", |config| config.logging.level.as_str());
    let env_filter = match config {
        Some(_) => EnvFilter::new(format!("{level},docrag={level}")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,docrag=debug")),
    };

    let file_appender = tracing_appender::rolling::daily("logs", "docrag.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    Registry::default()
        .with(env_filter)
        .with(detailed_layer().with_writer(std::io::stderr))
        .with(detailed_layer().with_writer(file_writer).with_ansi(false))
        .init();

    tracing::info!("Logging initialized at level {} (console + file)", level);
    tracing::info!("Log files roll daily under logs/docrag.log.YYYY-MM-DD");

    // The guard must outlive every future log line.
    std::mem::forget(guard);

    Ok(())
}

fn detailed_layer<S>() -> fmt::Layer<S> {
    fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
}

/// Console-only logging for tests and one-off tools.
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_init_is_idempotent_enough() {
        // A second global init would fail; ignoring the result keeps this
        // safe to run alongside other tests that also log.
        let _ = init_simple_logging();
        let _ = init_simple_logging();
    }
}
