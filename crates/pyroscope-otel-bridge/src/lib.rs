//! Capability boundary between span correlation and the sampling profiler.
//!
//! Everything the correlation engine needs from a profiler goes through
//! [`ProfilerBridge`]. A bundled in-process profiler state and a no-op
//! layer are provided; out-of-process profilers plug in by implementing
//! the trait.

pub mod backend;
pub mod bridge;
pub mod encoding;
pub mod in_process;

pub use backend::ProfilerBackend;
pub use bridge::{ProfilerBridge, ScopedContext, TracingContext};
pub use encoding::{encode_tracing_context, register_label};
pub use in_process::InProcessProfiler;
