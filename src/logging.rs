//! Minimal pluggable logging capability consumed by the engine (§6).
//!
//! The core never requires a specific sink. `NullLogger` is the default;
//! `LogFacadeLogger` bridges into the `log` crate for hosts that already
//! have a subscriber wired up.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        write!(f, "{s}")
    }
}

/// A structured log sink. Implementations must not panic.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &[(&str, String)]);
}

/// Discards every record. Used when the caller does not supply a logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str, _context: &[(&str, String)]) {}
}

/// Bridges into the `log` crate's global facade. The context pairs are
/// flattened into the message since the pinned `log` version does not carry
/// structured key-value support by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacadeLogger;

impl Logger for LogFacadeLogger {
    fn log(&self, level: LogLevel, message: &str, context: &[(&str, String)]) {
        let rendered = render(message, context);
        match level {
            LogLevel::Debug => log::debug!("{rendered}"),
            LogLevel::Info => log::info!("{rendered}"),
            LogLevel::Warning => log::warn!("{rendered}"),
            LogLevel::Error | LogLevel::Fatal => log::error!("{rendered}"),
        }
    }
}

fn render(message: &str, context: &[(&str, String)]) -> String {
    if context.is_empty() {
        return message.to_string();
    }
    let mut out = String::from(message);
    out.push_str(" (");
    for (i, (key, value)) in context.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push('=');
        out.push_str(value);
    }
    out.push(')');
    out
}
