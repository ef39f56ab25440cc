use std::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{} {}: {}",
                LevelFormat(record.level()),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the stderr logger.
///
/// Heap warnings are always shown; `verbose` adds every operation trace.
pub fn init(verbose: bool) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(if verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    });
    Ok(())
}

struct LevelFormat(Level);

impl fmt::Display for LevelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (color, msg) = match self.0 {
            Level::Trace => (35, "TRACE"),
            Level::Debug => (34, "DEBUG"),
            Level::Info => (32, " INFO"),
            Level::Warn => (33, " WARN"),
            Level::Error => (31, "ERROR"),
        };
        write!(f, "\x1B[{color};1m{msg}\x1B[0m")
    }
}
