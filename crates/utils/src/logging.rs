// SDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Logging configuration for SDB components
//!
//! Provides centralized logging setup with:
//! - Colorful console output with structured formatting
//! - File logging to a temporary (or `SDB_LOG_DIR`) directory
//! - Environment variable support (RUST_LOG)
//! - Default INFO level

use eyre::{eyre, Result};
use sdb_common::env::SDB_LOG_DIR;
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize logging for an SDB host
///
/// This function sets up:
/// - Colorful, structured console logging with timestamps
/// - File logging with daily rotation
/// - Environment variable support for log levels (RUST_LOG)
/// - Default INFO level if no RUST_LOG is set
///
/// # Arguments
/// * `component_name` - Name of the component (e.g., "sdb", "my-game")
/// * `enable_file_logging` - Whether to also write log files
///
/// # Examples
/// ```rust,no_run
/// use sdb_utils::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("my-game", true)?;
///     tracing::info!("Application started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let env_filter = default_filter("info")?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .pretty();

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;

        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (non_blocking_appender, guard) = non_blocking(file_appender);

        // The guard flushes on drop; the host keeps logging until exit.
        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(non_blocking_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer.with_filter(filter_for_console()))
            .with(file_layer.with_filter(filter_for_file()))
            .try_init()
            .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "Logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
            .map_err(|e| eyre!("Failed to initialize tracing subscriber: {e}"))?;

        tracing::info!(component = component_name, "Logging initialized with console output only");
    }

    log_environment_info(component_name);

    Ok(())
}

/// Environment filter from `RUST_LOG`, falling back to `default_level`
fn default_filter(default_level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| eyre!("Failed to create environment filter: {e}"))
}

/// Directory log files are written to, honouring `SDB_LOG_DIR`
fn log_directory(component_name: &str) -> PathBuf {
    match env::var_os(SDB_LOG_DIR) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(component_name),
        _ => env::temp_dir().join("sdb-logs").join(component_name),
    }
}

/// Create the log directory for a component
fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = log_directory(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

/// Filter for console output
fn filter_for_console() -> EnvFilter {
    EnvFilter::from_default_env()
}

/// Filter for file output
fn filter_for_file() -> EnvFilter {
    EnvFilter::from_default_env()
}

/// Log useful environment information
fn log_environment_info(component_name: &str) {
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing::info!(component = component_name, rust_log = %rust_log, "Environment information");

    if let Ok(current_dir) = env::current_dir() {
        tracing::debug!(working_directory = %current_dir.display(), "Working directory");
    }
}

/// Initialize simple logging (console only, no fancy formatting)
///
/// This is useful for tests or small hosts that don't need the full setup.
///
/// # Arguments
/// * `level` - The default log level to use
pub fn init_simple_logging(level: Level) -> Result<()> {
    let env_filter = default_filter(level.as_str())?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre!("Failed to initialize simple logging: {e}"))?;

    Ok(())
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Safe logging initialization for tests - can be called multiple times
///
/// Console-only output captured by the test harness; INFO by default but respects
/// `RUST_LOG`.
///
/// # Usage
/// ```rust
/// use sdb_utils::logging;
///
/// logging::ensure_test_logging(None);
/// tracing::info!("This will work safely in any test!");
/// ```
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        let default_level = default_level.unwrap_or(Level::INFO);
        // A subscriber may already be installed by another harness, which is fine.
        let _ = init_simple_logging(default_level);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tracing::{debug, error, info, warn};

    #[test]
    fn test_logging_functions_work() {
        ensure_test_logging(None);

        info!("Test info message");
        warn!("Test warning message");
        debug!("Test debug message");
        error!("Test error message");
    }

    #[test]
    #[serial]
    fn test_log_directory_creation() {
        env::remove_var(SDB_LOG_DIR);
        let log_dir = create_log_directory("test-component").unwrap();
        assert!(log_dir.exists());
        assert!(log_dir.to_string_lossy().contains("sdb-logs"));
        assert!(log_dir.to_string_lossy().contains("test-component"));
    }

    #[test]
    #[serial]
    fn test_log_directory_override() {
        let root = env::temp_dir().join("sdb-log-override-test");
        env::set_var(SDB_LOG_DIR, &root);
        let log_dir = log_directory("host");
        env::remove_var(SDB_LOG_DIR);

        assert_eq!(log_dir, root.join("host"));
    }

    #[test]
    fn test_fancy_logging_initialization_safety() {
        ensure_test_logging(None);

        // A subscriber is already installed, so both attempts fail without panicking
        let result1 = init_logging("test-fancy-1", false);
        let result2 = init_logging("test-fancy-2", false);
        assert!(result1.is_err() || result2.is_err());

        info!("Test logging after init attempts");
    }
}
