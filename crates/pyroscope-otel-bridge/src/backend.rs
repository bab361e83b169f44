//! Profiler backend selection.
//!
//! The backend is chosen once when correlation is installed and then handed
//! to every component that talks to the profiler.

use crate::bridge::{ProfilerBridge, ScopedContext, TracingContext};
use crate::in_process::InProcessProfiler;
use pyroscope_otel_core::{LabelSet, ProfilingError, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ProfilerBackend {
    /// Profiler state owned by this process.
    Bundled(Arc<InProcessProfiler>),
    /// A profiler SDK reached through a caller-supplied bridge.
    External(Arc<dyn ProfilerBridge>),
    /// No profiler: every operation is a no-op or returns a neutral value.
    Disabled,
}

impl ProfilerBackend {
    pub fn bundled() -> Self {
        Self::Bundled(Arc::new(InProcessProfiler::new()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bundled(_) => "bundled",
            Self::External(_) => "external",
            Self::Disabled => "disabled",
        }
    }

    pub fn in_process(&self) -> Option<&Arc<InProcessProfiler>> {
        match self {
            Self::Bundled(profiler) => Some(profiler),
            _ => None,
        }
    }
}

impl ProfilerBridge for ProfilerBackend {
    fn set_tracing_context(&self, context: TracingContext) {
        match self {
            Self::Bundled(profiler) => profiler.set_tracing_context(context),
            Self::External(bridge) => bridge.set_tracing_context(context),
            Self::Disabled => {}
        }
    }

    fn register_constant(&self, name: &str) -> Result<u64> {
        match self {
            Self::Bundled(profiler) => profiler.register_constant(name),
            Self::External(bridge) => bridge.register_constant(name),
            Self::Disabled => Err(ProfilingError::BridgeUnavailable),
        }
    }

    fn create_scoped_context(&self, labels: &LabelSet) -> Result<Box<dyn ScopedContext>> {
        match self {
            Self::Bundled(profiler) => profiler.create_scoped_context(labels),
            Self::External(bridge) => bridge.create_scoped_context(labels),
            Self::Disabled => Err(ProfilingError::BridgeUnavailable),
        }
    }

    fn is_profiling_started(&self) -> bool {
        match self {
            Self::Bundled(profiler) => profiler.is_profiling_started(),
            Self::External(bridge) => bridge.is_profiling_started(),
            Self::Disabled => false,
        }
    }

    fn start_profiling(&self) -> Result<()> {
        match self {
            Self::Bundled(profiler) => profiler.start_profiling(),
            Self::External(bridge) => bridge.start_profiling(),
            Self::Disabled => Err(ProfilingError::BridgeUnavailable),
        }
    }

    fn supports_scoped_contexts(&self) -> bool {
        match self {
            Self::Bundled(profiler) => profiler.supports_scoped_contexts(),
            Self::External(bridge) => bridge.supports_scoped_contexts(),
            Self::Disabled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{encode_tracing_context, register_label};

    #[test]
    fn disabled_backend_degrades_to_neutral_values() {
        let backend = ProfilerBackend::Disabled;
        backend.set_tracing_context(TracingContext::new(1, 2));
        assert_eq!(register_label(&backend, "GET /"), 0);
        assert!(!backend.supports_scoped_contexts());
        assert!(!backend.is_profiling_started());
        assert!(matches!(
            backend.create_scoped_context(&LabelSet::new()),
            Err(ProfilingError::BridgeUnavailable)
        ));

        let context = encode_tracing_context(&backend, "000000000000cafe", Some("GET /"));
        assert_eq!(context, TracingContext::new(0xcafe, 0));
    }

    #[test]
    fn bundled_backend_forwards_to_profiler() {
        let backend = ProfilerBackend::bundled();
        let profiler = backend.in_process().cloned().expect("bundled profiler");

        let context = encode_tracing_context(&backend, "000000000000cafe", Some("GET /"));
        assert_ne!(context.span_name_id, 0);
        backend.set_tracing_context(context);
        assert_eq!(profiler.current_tracing_context(), context);
        assert_eq!(backend.kind(), "bundled");
        assert!(backend.supports_scoped_contexts());
    }
}
