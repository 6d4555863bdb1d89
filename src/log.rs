//! Leveled file logging for the scene coordinator.
//!
//! Log levels:
//! - ERROR: Failures that stop a component (bind errors, dead channels)
//! - WARN: Recoverable oddities (dropped intents, query timeouts, probe errors)
//! - INFO: Scene commands, activity transitions, startup and shutdown
//! - DEBUG: Timer arming/cancellation, observer samples
//! - TRACE: Every poll and bus notification
//!
//! Lines go to `~/.mirror-scenes/mirror-scenes.log`, tagged with the module
//! that wrote them. Before [`init`] runs (tests, library use) WARN and above
//! go to stderr instead.
//!
//! `--debug` or `MIRROR_SCENES_DEBUG=1` selects DEBUG; `MIRROR_SCENES_LOG`
//! names an exact level and wins over both.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

pub const DEBUG_ENV: &str = "MIRROR_SCENES_DEBUG";
pub const LEVEL_ENV: &str = "MIRROR_SCENES_LOG";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level {:?}", other)),
        }
    }
}

/// Level selected by the flag and the environment.
fn resolve_level(debug_flag: bool, debug_env: Option<&str>, level_env: Option<&str>) -> LogLevel {
    if let Some(level) = level_env.and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = debug_env.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug_flag || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Start logging to the application log file, truncating it.
pub fn init(debug: bool) {
    let level = resolve_level(
        debug,
        std::env::var(DEBUG_ENV).ok().as_deref(),
        std::env::var(LEVEL_ENV).ok().as_deref(),
    );
    set_level(level);

    if let Some(app_dir) = dirs::home_dir().map(|h| h.join(".mirror-scenes")) {
        let _ = std::fs::create_dir_all(&app_dir);
        let path = app_dir.join("mirror-scenes.log");
        let _ = std::fs::write(&path, "");
        LOG_PATH.set(path).ok();
    }
}

pub fn is_debug() -> bool {
    enabled(LogLevel::Debug)
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level <= get_level()
}

/// Path of the active log file, if logging was initialized.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

fn format_line(timestamp: impl fmt::Display, level: LogLevel, target: &str, args: fmt::Arguments) -> String {
    let target = target.strip_prefix("mirror_scenes::").unwrap_or(target);
    format!("[{}] [{}] [{}] {}", timestamp, level.as_str(), target, args)
}

/// Write one line; used through the `mlog*` macros.
pub fn write(level: LogLevel, target: &str, args: fmt::Arguments) {
    if !enabled(level) {
        return;
    }

    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    match LOG_PATH.get() {
        Some(path) => {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", format_line(timestamp, level, target, args));
            }
        }
        None if level <= LogLevel::Warn => {
            eprintln!("{}", format_line(timestamp, level, target, args));
        }
        None => {}
    }
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! mlog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, module_path!(), format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, module_path!(), format_args!($($arg)*))
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! mlog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, module_path!(), format_args!($($arg)*))
    };
}

/// Log macro for TRACE level (`MIRROR_SCENES_LOG=trace`).
#[macro_export]
macro_rules! mlog_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, module_path!(), format_args!($($arg)*))
    };
}
