//! Tracing/logging initialization.
//!
//! Filtering follows `RUST_LOG` (default `info`). Stock writes log one event
//! per committed movement, so `info` is enough to reconstruct the ledger
//! activity of a process.

use core::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the process log.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event (production).
    #[default]
    Json,
    /// Human-readable lines (local development).
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}
