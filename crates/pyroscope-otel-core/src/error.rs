//! Error types for profiling correlation
//!
//! Errors only travel between the profiler bridge, configuration loading and
//! their callers. The span hooks never hand an error back to the tracing SDK.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilingError {
    /// No profiler is reachable through the bridge
    #[error("profiler bridge unavailable")]
    BridgeUnavailable,

    /// The profiler rejected or failed a call
    #[error("profiler bridge error: {0}")]
    Bridge(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ProfilingError>;
