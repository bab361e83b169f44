//! Profiler capability traits.

use pyroscope_otel_core::{LabelSet, Result};
use std::fmt;

/// What the native sampler tags new samples with on a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TracingContext {
    pub span_id: u64,
    pub span_name_id: u64,
}

impl TracingContext {
    /// Samples carry no span.
    pub const UNTAGGED: Self = Self { span_id: 0, span_name_id: 0 };

    pub const fn new(span_id: u64, span_name_id: u64) -> Self {
        Self { span_id, span_name_id }
    }

    pub fn is_untagged(&self) -> bool {
        *self == Self::UNTAGGED
    }
}

impl fmt::Display for TracingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.span_id, self.span_name_id)
    }
}

/// A label scope opened on the profiler.
///
/// While open, samples on the thread that opened it carry its labels. Scopes
/// nest per thread: the most recently opened one wins and closing it
/// restores the previous one.
pub trait ScopedContext: Send + Sync + fmt::Debug {
    /// Walk the scope's labels in key order.
    fn for_each_label(&self, visit: &mut dyn FnMut(&str, &str));

    fn close(self: Box<Self>);
}

/// Operations the correlation engine needs from a sampling profiler.
///
/// Implementations may live in-process or forward over IPC. Every method is
/// best-effort: callers turn errors into neutral values.
pub trait ProfilerBridge: Send + Sync + fmt::Debug {
    /// Set the tracing context of the calling thread.
    fn set_tracing_context(&self, context: TracingContext);

    /// Map a string to a small stable id. Ids are never reused.
    fn register_constant(&self, name: &str) -> Result<u64>;

    fn create_scoped_context(&self, labels: &LabelSet) -> Result<Box<dyn ScopedContext>>;

    fn is_profiling_started(&self) -> bool;

    fn start_profiling(&self) -> Result<()>;

    /// Whether [`create_scoped_context`](Self::create_scoped_context) is
    /// usable. Without it, span tagging falls back to
    /// [`set_tracing_context`](Self::set_tracing_context).
    fn supports_scoped_contexts(&self) -> bool {
        true
    }
}
