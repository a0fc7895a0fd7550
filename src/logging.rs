/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogConfig;
use crate::error::{VfsError, VfsResult};

/// Build the filter: `RUST_LOG` wins over the configured level
fn build_filter(config: &LogConfig) -> VfsResult<EnvFilter> {
    let log_level = config.level.to_tracing_level();

    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("orbit_smb_vfs={}", log_level)))
        .map_err(|e| VfsError::Config(format!("Failed to create log filter: {}", e)))
}

/// Initialize structured logging based on configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> VfsResult<()> {
    let env_filter = build_filter(config)?;

    match config.file {
        Some(ref log_path) => init_file_logging(log_path, env_filter, config.json),
        None => init_stdout_logging(env_filter, config.json),
    }
}

fn already_set(e: impl std::fmt::Display) -> VfsError {
    VfsError::Config(format!("Logging already initialized: {}", e))
}

/// Initialize logging to stdout
fn init_stdout_logging(env_filter: EnvFilter, json: bool) -> VfsResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().with_target(true).json())
            .try_init()
            .map_err(already_set)
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_span_events(FmtSpan::NONE)
            .compact();
        registry.with(fmt_layer).try_init().map_err(already_set)
    }
}

/// Initialize logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter, json: bool) -> VfsResult<()> {
    let file = File::create(log_path)
        .map_err(|e| VfsError::Config(format!("Failed to create log file: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false); // No ANSI colors in file

    if json {
        registry.with(fmt_layer.json()).try_init().map_err(already_set)
    } else {
        registry.with(fmt_layer).try_init().map_err(already_set)
    }
}

/// Initialize logging with the test writer; safe to call from every test
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("orbit_smb_vfs=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}
