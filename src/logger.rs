// This file implements the application's logging system.
// It provides macros for different log levels (INFO, WARN, ERROR, DEBUG) with a
// colored level tag, and routes every message through `tracing` so the verbosity
// is controlled by a single subscriber installed at startup.

use colored::{ColoredString, Colorize}; // Used for adding color to the level tags.
use tracing::Level;

/// Provides convenient logging macros.
/// `#[macro_export]` makes these macros available from the crate root.

// `log_info!` for general application progress and informational messages.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => (::tracing::info!("{} {}", $crate::logger::tag(::tracing::Level::INFO), format!($($arg)*)));
}

// `log_warn!` for non-critical issues or noteworthy conditions.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => (::tracing::warn!("{} {}", $crate::logger::tag(::tracing::Level::WARN), format!($($arg)*)));
}

// `log_error!` for failures that end the work on a tool or the run.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => (::tracing::error!("{} {}", $crate::logger::tag(::tracing::Level::ERROR), format!($($arg)*)));
}

// `log_debug!` for detailed internal tracing.
// Only printed when the subscriber was initialized in debug mode.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => (::tracing::debug!("{} {}", $crate::logger::tag(::tracing::Level::DEBUG), format!($($arg)*)));
}

/// Returns the colored `[LEVEL]` prefix used by the logging macros.
pub fn tag(level: Level) -> ColoredString {
    match level {
        Level::ERROR => "[ERROR]".bright_red(),
        Level::WARN => "[WARN]".bright_yellow(),
        Level::INFO => "[INFO]".bright_green(),
        _ => "[DEBUG]".dimmed(),
    }
}

/// Initializes the logger, setting the global verbosity.
/// This function should be called once at application startup; later calls are ignored.
///
/// # Arguments
/// * `debug`: If `true`, enables debug logging; otherwise, only info, warn, and error messages are printed.
pub fn init(debug: bool) {
    let max_level = if debug { Level::DEBUG } else { Level::INFO };

    // Messages already carry their own colored level tag, so the formatter only
    // needs to write the message itself to stderr.
    let installed = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(false)
        .without_time()
        .try_init()
        .is_ok();

    if installed {
        if debug {
            crate::log_debug!("Logger initialized in DEBUG mode");
        } else {
            crate::log_debug!("Logger initialized in INFO mode");
        }
    }
}
