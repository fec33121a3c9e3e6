//! Structured logging initialization.

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a log format name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set; `verbose` raises the default
/// level to debug. Safe to call once per process.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when logging was already initialized.
pub fn init(format: LogFormat, verbose: bool) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docvault={default_level}")));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };
    result.map_err(|e| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    })?;

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })
}
