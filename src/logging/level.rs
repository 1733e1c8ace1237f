use crate::error::{Result, SolarmapError};
use tracing::Level;

pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        _ => Err(SolarmapError::config(format!(
            "Invalid log level: {}",
            level_str
        ))),
    }
}

pub fn level_rank(level: Level) -> u8 {
    match level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

/// The more verbose of two levels
pub fn min_level(a: Level, b: Level) -> Level {
    if level_rank(a) <= level_rank(b) { a } else { b }
}

/// Lowercase directive name for an `EnvFilter`
pub fn directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_min_level_prefers_verbose() {
        assert_eq!(min_level(Level::INFO, Level::DEBUG), Level::DEBUG);
        assert_eq!(min_level(Level::ERROR, Level::WARN), Level::WARN);
        assert_eq!(directive(Level::TRACE), "trace");
    }
}
