//! Logging and debug utilities.
//!
//! This module provides a minimal [`log`] backend writing to stderr, for
//! development and troubleshooting support.

use std::env;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Debug | Level::Trace => eprintln!("{}", record.args()),
            level => eprintln!("{level}: {}", record.args()),
        }
    }

    fn flush(&self) {}
}

/// The level selected by a `DEBUG` value: off when unset, `trace` when set to
/// `trace`, `debug` otherwise.
fn level_from(debug: Option<&str>) -> LevelFilter {
    match debug {
        None => LevelFilter::Off,
        Some(v) if v.eq_ignore_ascii_case("trace") => LevelFilter::Trace,
        Some(_) => LevelFilter::Debug,
    }
}

/// Install the stderr logger.
///
/// Messages are only printed if the `DEBUG` environment variable is set, so
/// debug output costs nothing in normal runs.
///
/// # Errors
///
/// Returns an error if a logger was already installed.
pub fn init() -> Result<(), SetLoggerError> {
    let debug = env::var("DEBUG").ok();
    log::set_logger(&LOGGER)?;
    log::set_max_level(level_from(debug.as_deref()));
    Ok(())
}
