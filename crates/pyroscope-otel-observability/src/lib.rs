//! Observability helpers (log setup, log field formatting).

pub mod summary;
pub mod tracing_setup;

pub use summary::*;
pub use tracing_setup::*;
