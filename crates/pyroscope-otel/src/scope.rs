//! Profiling scope owned by a tracked span.

use pyroscope_otel_bridge::{ProfilerBridge, ScopedContext, TracingContext};
use pyroscope_otel_core::{LabelSet, ProfileId, unix_millis};
use pyroscope_otel_observability::labels_summary;
use std::time::SystemTime;

/// A correlation window: while open, the profiler tags samples with its
/// labels. The native scope is closed exactly once, by [`close`] or on drop.
///
/// [`close`]: ProfilingScope::close
#[derive(Debug)]
pub struct ProfilingScope {
    profile_id: ProfileId,
    labels: LabelSet,
    start_time: SystemTime,
    tracing_context: TracingContext,
    native: Option<Box<dyn ScopedContext>>,
}

impl ProfilingScope {
    /// Open a scope on the profiler. If the profiler cannot open one, the
    /// scope still carries its labels for query building.
    pub fn open(
        bridge: &dyn ProfilerBridge,
        profile_id: ProfileId,
        labels: LabelSet,
        tracing_context: TracingContext,
        start_time: SystemTime,
    ) -> Self {
        let native = match bridge.create_scoped_context(&labels) {
            Ok(native) => Some(native),
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    labels = %labels_summary(&labels),
                    "native scoped context unavailable, scope degraded"
                );
                None
            }
        };
        Self {
            profile_id,
            labels,
            start_time,
            tracing_context,
            native,
        }
    }

    /// A scope with no native counterpart.
    pub fn detached(
        profile_id: ProfileId,
        labels: LabelSet,
        tracing_context: TracingContext,
        start_time: SystemTime,
    ) -> Self {
        Self {
            profile_id,
            labels,
            start_time,
            tracing_context,
            native: None,
        }
    }

    pub fn profile_id(&self) -> &ProfileId {
        &self.profile_id
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn start_time_millis(&self) -> u64 {
        unix_millis(self.start_time)
    }

    pub fn tracing_context(&self) -> TracingContext {
        self.tracing_context
    }

    pub fn has_native_scope(&self) -> bool {
        self.native.is_some()
    }

    /// Walk the labels in key order, as the profiler reports them when a
    /// native scope is open.
    pub fn for_each_label<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &str),
    {
        match &self.native {
            Some(native) => native.for_each_label(&mut visit),
            None => {
                for (key, value) in self.labels.iter() {
                    visit(key, value);
                }
            }
        }
    }

    pub fn close(mut self) {
        self.close_native();
    }

    fn close_native(&mut self) {
        if let Some(native) = self.native.take() {
            native.close();
        }
    }
}

impl Drop for ProfilingScope {
    fn drop(&mut self) {
        self.close_native();
    }
}
