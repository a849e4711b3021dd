//! Server configuration, parsed from the command line.
//!
//! Held as a plain value and threaded into constructors; nothing here
//! is process-global.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::arena::DEFAULT_CAPACITY;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "matchgate",
    version,
    about = "Limit order matching engine with a framed TCP gateway"
)]
pub struct Config {
    /// Server port.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, ignore_case = true)]
    pub log_level: LogLevel,

    /// Drain the event log through the engine before accepting
    /// connections.
    #[arg(long)]
    pub replay_mode: bool,

    /// Order arena capacity.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: u32,

    /// Directory holding the event log.
    #[arg(long, default_value = "bins")]
    pub log_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["matchgate"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, LogLevel::Info);
        assert!(!config.replay_mode);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.log_dir, PathBuf::from("bins"));
    }

    #[test]
    fn test_flags() {
        let config = Config::parse_from([
            "matchgate",
            "--port",
            "9000",
            "--log-level",
            "DEBUG",
            "--replay-mode",
            "--capacity",
            "5000",
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.replay_mode);
        assert_eq!(config.capacity, 5000);
    }
}
