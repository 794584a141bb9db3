//! Tracing setup for the worker: human-readable lines on stderr and a daily
//! rolling JSON file for the job history.

use std::env;
use std::fs;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{PipelineError, Result};

pub const LOG_DIR_ENV: &str = "HCS_PIPELINE_LOG_DIR";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "hcs-pipeline.log";
const DEFAULT_FILTER: &str = "hcs_pipeline=info,warn";

/// Directory for the JSON log files, `HCS_PIPELINE_LOG_DIR` when set and non-empty.
fn log_dir(configured: Option<String>) -> PathBuf {
    configured
        .map(|dir| dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Stdout is left to the CLI's JSON output. Buffered file lines are flushed when
/// the returned guard drops, so hold it until the process exits.
pub fn init_logging() -> Result<WorkerGuard> {
    let dir = log_dir(env::var(LOG_DIR_ENV).ok());
    fs::create_dir_all(&dir)?;

    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_current_span(true).with_writer(file_writer))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| PipelineError::Configuration(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_falls_back_to_default() {
        assert_eq!(log_dir(None), PathBuf::from("logs"));
        assert_eq!(log_dir(Some("  ".to_string())), PathBuf::from("logs"));
        assert_eq!(log_dir(Some("/var/log/hcs".to_string())), PathBuf::from("/var/log/hcs"));
    }
}
