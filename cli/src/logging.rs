//! Tracing setup.
//!
//! Runs log to stderr and to the log file that is submitted with the results.

use std::path::Path;
use std::sync::Arc;

use ccert_core::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` when set, otherwise the configured level.
fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Log to stderr only.
pub fn init_stderr(level: LogLevel) {
    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log to stderr and to `logfile`, truncating it.
pub fn init_with_file(level: LogLevel, logfile: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = logfile.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(logfile)
        .map_err(|e| format!("could not open log file {}: {}", logfile.display(), e))?;

    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .try_init()?;
    Ok(())
}
