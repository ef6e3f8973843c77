//! Diagnostic reporting.
//!
//! Nothing in this crate is allowed to fail the host: rule errors, handler
//! errors and resolution errors all degrade to fewer (or less precise) links
//! plus a message routed through a [`DiagnosticSink`].
//!
//! The host decides where messages end up. [`LogSink`] forwards them to the
//! `log` facade, which is what most embedders want.

use std::fmt;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Error => "Error",
            Level::Warn => "Warn",
            Level::Info => "Info",
        };
        f.write_str(label)
    }
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Info => log::Level::Info,
        }
    }
}

/// Receiver for user-facing diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }
}

/// Forwards diagnostics to the `log` crate under the `linksmith` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "linksmith", log::Level::from(level), "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn log(&self, _level: Level, _message: &str) {}
}
