//! Structured logging and tracing for solarmap
//!
//! Console output, an optional daily-rotated log file and per-component
//! context fields, all on top of the tracing ecosystem.

mod level;
mod structured;

pub use level::parse_log_level;
pub use structured::{LogContext, StructuredLogger, get_logger, get_logger_with_context};

use crate::config::LoggingConfig;
use crate::error::{Result, SolarmapError};
use level::{directive, min_level};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Once;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Keep the non-blocking worker guard alive for the entire process lifetime
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static INIT_ONCE: Once = Once::new();
static INIT_ERROR: OnceCell<String> = OnceCell::new();

/// Initialize logging system based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    INIT_ONCE.call_once(|| {
        let init_result = (|| -> Result<()> {
            let base_level = parse_log_level(&config.level)?;

            // Most verbose base level so layer-specific filters can down-filter
            let console_level = config
                .console_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);
            let file_level = config
                .file_level
                .as_ref()
                .and_then(|s| parse_log_level(s).ok())
                .unwrap_or(base_level);

            let filter = build_env_filter(min_level(console_level, file_level));

            if should_use_console_only() {
                init_console_only_logging(config, filter, console_level);
                return Ok(());
            }
            init_file_logging(config, filter, console_level, file_level)
        })();

        if let Err(e) = init_result {
            let _ = INIT_ERROR.set(e.to_string());
        }
    });

    if let Some(err) = INIT_ERROR.get() {
        return Err(SolarmapError::config(err.clone()));
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("solarmap={},tokio_modbus=warn", directive(level)).into())
}

fn should_use_console_only() -> bool {
    cfg!(test) || std::env::var_os("SOLARMAP_DISABLE_FILE_LOG").is_some()
}

fn console_layer<S>(json_format: bool, level: Level) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    // Stderr keeps stdout free for the poller's JSON snapshots
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);
    if json_format {
        base.json()
            .with_filter(LevelFilter::from_level(level))
            .boxed()
    } else {
        base.with_filter(LevelFilter::from_level(level)).boxed()
    }
}

/// Console layer, or none when `console_output` is off
fn optional_console_layer<S>(
    config: &LoggingConfig,
    level: Level,
) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    config
        .console_output
        .then(|| console_layer(config.json_format, level))
}

fn init_console_only_logging(config: &LoggingConfig, filter: EnvFilter, console_level: Level) {
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(optional_console_layer(config, console_level))
        .try_init()
        .is_ok();

    if installed {
        info!(
            "Logging initialized - console_level: {:?}, console-only",
            console_level
        );
    }
}

/// Directory for rotated log files; a path with an extension names a file
fn log_directory(file: &str) -> &Path {
    let p = Path::new(file);
    if p.extension().is_some() {
        p.parent().unwrap_or(p)
    } else {
        p
    }
}

fn init_file_logging(
    config: &LoggingConfig,
    filter: EnvFilter,
    console_level: Level,
    file_level: Level,
) -> Result<()> {
    let file_appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("solarmap")
        .filename_suffix("log")
        .max_log_files(config.backup_count as usize)
        .build(log_directory(&config.file))
        .map_err(|e| SolarmapError::io(format!("Failed to create log file appender: {}", e)))?;

    let (non_blocking_appender, guard) = non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let file_layer = {
        let base = fmt::layer()
            .with_writer(non_blocking_appender)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_ansi(false);
        if config.json_format {
            base.json()
                .with_filter(LevelFilter::from_level(file_level))
                .boxed()
        } else {
            base.with_filter(LevelFilter::from_level(file_level))
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(optional_console_layer(config, console_level))
        .try_init()
        .map_err(|e| SolarmapError::config(format!("Failed to install logger: {}", e)))?;

    info!(
        "Logging initialized - console_level: {:?}, file_level: {:?}, file: {}",
        console_level, file_level, config.file
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context() {
        let context = LogContext::new("test")
            .with_device("inverter-1")
            .with_field("unit_id", "247".to_string());

        assert_eq!(context.component, "test");
        assert_eq!(context.device.as_deref(), Some("inverter-1"));
        assert_eq!(context.extra_fields.get("unit_id"), Some(&"247".to_string()));

        let logger = get_logger_with_context(context);
        assert_eq!(
            logger.format_fields(),
            "component=test,device=inverter-1,unit_id=247"
        );
    }

    #[test]
    fn test_structured_logger() {
        init_logging(&LoggingConfig::default()).unwrap();
        let logger = get_logger("test_component");
        assert_eq!(logger.context().component, "test_component");

        // These should not panic
        logger.info("Test info message");
        logger.debug("Test debug message");
        logger.warn("Test warning message");
        logger.error("Test error message");
    }

    #[test]
    fn test_console_output_switch() {
        use tracing_subscriber::Registry;

        let mut config = LoggingConfig::default();
        assert!(optional_console_layer::<Registry>(&config, Level::INFO).is_some());
        config.console_output = false;
        assert!(optional_console_layer::<Registry>(&config, Level::INFO).is_none());
    }

    #[test]
    fn test_log_directory() {
        assert_eq!(log_directory("/var/log/solarmap.log"), Path::new("/var/log"));
        assert_eq!(log_directory("/var/log/solarmap"), Path::new("/var/log/solarmap"));
    }
}
