//! Logging infrastructure for secvarctl
//!
//! This module provides logging via the `log` crate, outputting to stderr.

use log::{Level, LevelFilter, Metadata, Record};
use std::io::{IsTerminal, Write};

/// Stderr logger implementation
struct StderrLogger;

impl StderrLogger {
    fn level_str(level: Level, color: bool) -> &'static str {
        match (level, color) {
            (Level::Error, true) => "\x1b[31mERROR\x1b[0m",
            (Level::Warn, true) => "\x1b[33mWARN\x1b[0m ",
            (Level::Info, true) => "\x1b[32mINFO\x1b[0m ",
            (Level::Debug, true) => "\x1b[34mDEBUG\x1b[0m",
            (Level::Trace, true) => "\x1b[35mTRACE\x1b[0m",
            (Level::Error, false) => "ERROR",
            (Level::Warn, false) => "WARN ",
            (Level::Info, false) => "INFO ",
            (Level::Debug, false) => "DEBUG",
            (Level::Trace, false) => "TRACE",
        }
    }
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let stderr = std::io::stderr();
            let level_str = Self::level_str(record.level(), stderr.is_terminal());

            // Format: [LEVEL] target: message
            let _ = writeln!(
                stderr.lock(),
                "[{}] {}: {}",
                level_str,
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Level used for a given verbosity
pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Initialize the logging subsystem
///
/// Only the first call installs the logger; later calls just adjust the level.
pub fn init(verbose: bool) {
    let _ = log::set_logger(&LOGGER);
    set_level(level_for(verbose));
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(level_for(false), LevelFilter::Warn);
        assert_eq!(level_for(true), LevelFilter::Debug);
    }

    #[test]
    fn test_plain_level_names_line_up() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace] {
            assert_eq!(StderrLogger::level_str(level, false).len(), 5);
        }
    }
}
