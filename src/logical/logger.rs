//! Leveled logger handed to backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Severity of a log line, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Logger available to a backend after `setup`.
///
/// Emitting never fails the caller. Level queries may cross the process
/// boundary and are therefore async.
#[async_trait]
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message)
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message)
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message)
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message)
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message)
    }

    async fn is_enabled(&self, level: LogLevel) -> bool;

    async fn is_trace(&self) -> bool {
        self.is_enabled(LogLevel::Trace).await
    }

    async fn is_debug(&self) -> bool {
        self.is_enabled(LogLevel::Debug).await
    }

    async fn is_info(&self) -> bool {
        self.is_enabled(LogLevel::Info).await
    }

    async fn is_warn(&self) -> bool {
        self.is_enabled(LogLevel::Warn).await
    }

    fn set_level(&self, level: LogLevel);
}

/// [`Logger`] that emits through `tracing` with a backend name field.
#[derive(Debug)]
pub struct TracingLogger {
    name: String,
    level: AtomicU8,
}

impl TracingLogger {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self { name: name.into(), level: AtomicU8::new(level as u8) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("backend", LogLevel::Info)
    }
}

#[async_trait]
impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if level < self.level() {
            return;
        }
        let backend = self.name.as_str();
        match level {
            LogLevel::Trace => tracing::trace!(backend, "{}", message),
            LogLevel::Debug => tracing::debug!(backend, "{}", message),
            LogLevel::Info => tracing::info!(backend, "{}", message),
            LogLevel::Warn => tracing::warn!(backend, "{}", message),
            LogLevel::Error => tracing::error!(backend, "{}", message),
        }
    }

    async fn is_enabled(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }
}
