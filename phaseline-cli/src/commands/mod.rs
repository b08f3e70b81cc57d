//! CLI command implementations

pub mod check;
pub mod embed;
pub mod list;
pub mod logs;
pub mod run;
pub mod serve;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use phaseline_core::{Config, EntryPoint, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let phaseline_dir = get_phaseline_dir().ok()?;
    // Ensure directory exists
    std::fs::create_dir_all(&phaseline_dir).ok()?;
    LoggingService::new(&phaseline_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the phaseline directory from environment or default
pub fn get_phaseline_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PHASELINE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".phaseline"))
        .ok_or_else(|| anyhow!("Could not find home directory; set PHASELINE_DIR"))
}

/// Load the process-wide configuration
pub fn get_config() -> Result<Config> {
    let phaseline_dir = get_phaseline_dir()?;
    Config::load(&phaseline_dir)
        .with_context(|| format!("Failed to load configuration from {:?}", phaseline_dir))
}

/// Drive an async core operation to completion
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    Ok(runtime.block_on(future))
}
